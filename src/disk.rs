use std::{
    fs,
    io::{Read, Write},
    path::Path,
};

use crate::errors::{BoneError, FileOperation, IoError};

/// Access to the real filesystem underneath the virtual folders.
pub trait Disk {
    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn Read>, BoneError>;

    /// Creates or truncates `path`. The parent directory must exist.
    fn create(&self, path: &Path) -> Result<Box<dyn Write>, BoneError>;

    /// Entry names of a directory, sorted.
    fn read_dir(&self, path: &Path) -> Result<Vec<String>, BoneError>;

    fn mkdir_recursive(&self, path: &Path) -> Result<(), BoneError>;

    /// Removes a file or a whole directory tree. A missing path is not an error.
    fn remove_path(&self, path: &Path) -> Result<(), BoneError>;

    /// Moves `from` over `to`, replacing an existing file.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), BoneError>;
}

/// [`Disk`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDisk;

impl Disk for LocalDisk {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read>, BoneError> {
        let file = fs::File::open(path)
            .map_err(|error| IoError::new(FileOperation::Read, path.to_path_buf(), error))?;

        Ok(Box::new(file))
    }

    fn create(&self, path: &Path) -> Result<Box<dyn Write>, BoneError> {
        let file = fs::File::create(path)
            .map_err(|error| IoError::new(FileOperation::Write, path.to_path_buf(), error))?;

        Ok(Box::new(file))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<String>, BoneError> {
        let entries = fs::read_dir(path)
            .map_err(|error| IoError::new(FileOperation::ReadDir, path.to_path_buf(), error))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|error| IoError::new(FileOperation::ReadDir, path.to_path_buf(), error))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();

        Ok(names)
    }

    fn mkdir_recursive(&self, path: &Path) -> Result<(), BoneError> {
        fs::create_dir_all(path)
            .map_err(|error| IoError::new(FileOperation::Mkdir, path.to_path_buf(), error))?;

        Ok(())
    }

    fn remove_path(&self, path: &Path) -> Result<(), BoneError> {
        let removed = if path.is_dir() {
            fs::remove_dir_all(path)
        } else if path.exists() {
            fs::remove_file(path)
        } else {
            return Ok(());
        };

        removed.map_err(|error| IoError::new(FileOperation::Remove, path.to_path_buf(), error))?;

        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), BoneError> {
        fs::rename(from, to)
            .map_err(|error| IoError::new(FileOperation::Rename, from.to_path_buf(), error))?;

        Ok(())
    }
}
