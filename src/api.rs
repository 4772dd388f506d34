//! Command implementations behind the `bone` binary.
use colored::Colorize;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{
    config::Bonefile,
    errors::{BoneError, FileOperation, IoError},
    fs::Lookup,
    plugins::Registry,
    preview, Bone,
};

/// Loads a bonefile with the built-in plugins.
///
/// # Errors
///
/// Returns a [`BoneError`] if the file cannot be read or parsed, or if one of
/// its `[[dest]]` tables is invalid.
pub fn load(bonefile: &Path) -> Result<Bone, BoneError> {
    log::debug!("loading {}", bonefile.display());

    Bonefile::from_file(bonefile)?.apply(&Registry::builtin())
}

/// Builds the given folders, or every folder in dependency order when none
/// is given, and reports each written file.
pub fn build(bone: &Bone, folders: &[String]) -> Result<(), BoneError> {
    let written = if folders.is_empty() {
        bone.build_all()?
    } else {
        let mut written = Vec::new();
        for folder in folders {
            written.extend(bone.build(folder)?);
        }
        written
    };

    for path in written {
        println!("{} {}", "create".green(), path.display());
    }

    Ok(())
}

/// Streams a file to stdout.
pub fn cat(bone: &Bone, path: &str) -> Result<(), BoneError> {
    let mut reader = bone.create_read_stream(path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    io::copy(&mut reader, &mut out)
        .map_err(|error| BoneError::from_stream(error, FileOperation::Read, Path::new(path)))?;
    out.flush()
        .map_err(|error| IoError::new(FileOperation::Write, PathBuf::from("<stdout>"), error))?;

    Ok(())
}

pub fn ls(bone: &Bone, path: &str) -> Result<(), BoneError> {
    for name in bone.read_dir(path)? {
        println!("{}", name);
    }

    Ok(())
}

pub fn search(bone: &Bone, pattern: &str, virtual_only: bool) -> Result<(), BoneError> {
    let lookup = if virtual_only {
        Lookup::VirtualOnly
    } else {
        Lookup::Everywhere
    };

    for path in bone.search(pattern, lookup)? {
        println!("{}", path.display());
    }

    Ok(())
}

pub fn project(bone: &Bone, name: &str) -> Result<(), BoneError> {
    for path in bone.project(name)? {
        println!("{}", path.display());
    }

    Ok(())
}

/// Prints the virtual files of `folder` as a tree.
pub fn tree(bone: &Bone, folder: &str) -> Result<(), BoneError> {
    let root = bone.path_resolve(folder, None);
    let files = bone.virtual_files(&root)?;

    preview::preview_as_tree(&root, &files);

    Ok(())
}
