//! Filesystem-shaped access to the overlay: reads see virtual files first,
//! writes and directory changes go to the real filesystem.
use indexmap::IndexSet;
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};

use crate::{
    errors::{BoneError, FileOperation, ResolutionError, WriteTargetError},
    pipeline::{FileInfo, PipelineReader},
    resolve::{Resolved, Walk},
    Bone,
};

/// Which layers an existence check or a search consults.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    #[default]
    Everywhere,
    VirtualOnly,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WriteOptions {
    /// Create missing parent directories instead of failing.
    pub focus: bool,
}

impl Bone {
    pub fn base(&self) -> &Path {
        self.paths.base()
    }

    /// Resolves `path` against `base` (or the bone base), expanding the `~` alias.
    pub fn path_resolve(&self, path: &str, base: Option<&str>) -> PathBuf {
        self.paths.resolve(path, base)
    }

    /// Whether `path` is a virtual file or, unless `lookup` is
    /// [`Lookup::VirtualOnly`], a real one. Never fails.
    pub fn exist_file(&self, path: &str, lookup: Lookup) -> bool {
        self.exist_path(&self.paths.resolve(path, None), lookup)
    }

    pub(crate) fn exist_path(&self, target: &Path, lookup: Lookup) -> bool {
        match self.locate_in(target, &mut Walk::default()) {
            Ok(Resolved::Virtual(_)) => true,
            Ok(Resolved::Real(real)) => lookup == Lookup::Everywhere && self.disk.is_file(&real),
            Err(error) => {
                log::warn!("cannot resolve {}: {}", target.display(), error);
                false
            }
        }
    }

    /// Reads the whole content of `path`, virtual or real.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, BoneError> {
        let target = self.paths.resolve(path, None);
        self.read_path(&target)
    }

    pub(crate) fn read_path(&self, target: &Path) -> Result<Vec<u8>, BoneError> {
        let mut reader = self.open_path(target)?;
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|error| BoneError::from_stream(error, FileOperation::Read, target))?;

        Ok(content)
    }

    /// Streams the content of `path`. Plugins run as the reader is pulled, so
    /// a slow consumer slows down the whole chain.
    pub fn create_read_stream(&self, path: &str) -> Result<Box<dyn Read>, BoneError> {
        let target = self.paths.resolve(path, None);
        self.open_path(&target)
    }

    pub(crate) fn open_path(&self, target: &Path) -> Result<Box<dyn Read>, BoneError> {
        let (reader, _) = self.open_in(target, &mut Walk::default())?;
        Ok(reader)
    }

    /// Opens `target`, returning the reader and the real file at the bottom
    /// of the chain.
    fn open_in(&self, target: &Path, walk: &mut Walk) -> Result<(Box<dyn Read>, PathBuf), BoneError> {
        let hit = match self.locate_in(target, walk)? {
            Resolved::Real(real) => {
                if !self.disk.is_file(&real) {
                    return Err(ResolutionError::NotFound { path: real }.into());
                }
                log::debug!("reading {} from disk", real.display());
                let reader = self.disk.open(&real)?;

                return Ok((reader, real));
            }
            Resolved::Virtual(hit) => hit,
        };

        walk.enter(target);
        let opened = self.open_in(&hit.source, walk);
        walk.leave();
        let (reader, origin) = opened?;

        let definition = self
            .graph
            .definition(&hit.folder, hit.definition)
            .ok_or_else(|| ResolutionError::NotFound {
                path: target.to_path_buf(),
            })?;
        if definition.pipeline().is_empty() {
            return Ok((reader, origin));
        }

        let stages = definition
            .pipeline()
            .iter()
            .map(|plugin| {
                let info = FileInfo {
                    destination: hit.destination.clone(),
                    source: hit.source.clone(),
                };
                plugin.instantiate(info, Some(origin.clone()))
            })
            .collect();

        Ok((Box::new(PipelineReader::new(reader, stages)), origin))
    }

    /// Opens a real file for writing.
    pub fn create_write_stream(
        &self,
        path: &str,
        options: WriteOptions,
    ) -> Result<Box<dyn Write>, BoneError> {
        let target = self.paths.resolve(path, None);
        self.create_path(&target, options)
    }

    pub(crate) fn create_path(
        &self,
        target: &Path,
        options: WriteOptions,
    ) -> Result<Box<dyn Write>, BoneError> {
        let dir = target.parent().unwrap_or(target).to_path_buf();

        if !self.disk.is_dir(&dir) {
            if !options.focus {
                return Err(WriteTargetError::MissingDirectory {
                    path: target.to_path_buf(),
                    dir,
                }
                .into());
            }

            self.disk.mkdir_recursive(&dir).map_err(|error| match error {
                BoneError::Io(source) => WriteTargetError::CreateDirectory {
                    path: target.to_path_buf(),
                    dir: dir.clone(),
                    source,
                }
                .into(),
                other => other,
            })?;
        }

        self.disk.create(target)
    }

    /// Real paths matching `pattern` (unless `lookup` is
    /// [`Lookup::VirtualOnly`]) followed by matching virtual files.
    pub fn search(&self, pattern: &str, lookup: Lookup) -> Result<Vec<PathBuf>, BoneError> {
        let pattern = self.paths.resolve(pattern, None);
        self.search_path(&pattern, lookup)
    }

    pub(crate) fn search_path(
        &self,
        pattern: &Path,
        lookup: Lookup,
    ) -> Result<Vec<PathBuf>, BoneError> {
        let mut found = IndexSet::new();

        if lookup == Lookup::Everywhere {
            found.extend(self.real_glob(pattern)?);
        }
        found.extend(self.virtual_matches(pattern, &mut Walk::default())?);

        Ok(found.into_iter().collect())
    }

    /// Entry names of a real or virtual directory. Virtual subfolders show up
    /// as their first path component.
    pub fn read_dir(&self, path: &str) -> Result<Vec<String>, BoneError> {
        let dir = self.paths.resolve(path, None);
        let mut names = IndexSet::new();

        let real = self.disk.is_dir(&dir);
        if real {
            names.extend(self.disk.read_dir(&dir)?);
        }

        for file in self.virtual_files(&dir)? {
            let first = file
                .strip_prefix(&dir)
                .ok()
                .and_then(|rest| rest.components().next());
            if let Some(first) = first {
                names.insert(first.as_os_str().to_string_lossy().to_string());
            }
        }

        if !real && names.is_empty() && self.graph.folder(&dir).is_none() {
            Err(ResolutionError::NotADirectory { path: dir })?
        }

        Ok(names.into_iter().collect())
    }

    /// Every virtual file below `dir`, nested folders included.
    pub(crate) fn virtual_files(&self, dir: &Path) -> Result<Vec<PathBuf>, BoneError> {
        self.virtual_matches(&dir.join("**/*"), &mut Walk::default())
    }

    pub fn mkdir(&self, path: &str) -> Result<(), BoneError> {
        let dir = self.paths.resolve(path, None);
        log::debug!("creating directory {}", dir.display());

        self.disk.mkdir_recursive(&dir)
    }

    /// Removes a real file or directory tree; a missing path is not an error.
    pub fn rm(&self, path: &str) -> Result<(), BoneError> {
        let target = self.paths.resolve(path, None);
        log::debug!("removing {}", target.display());

        self.disk.remove_path(&target)
    }

    /// Forgets cached glob expansions so later calls see real changes.
    pub fn refresh(&self) {
        let mut globs = self.globs.borrow_mut();
        log::debug!("dropping {} cached glob expansions", globs.len());
        globs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, Bone) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.txt"), "a").unwrap();

        let mut bone = Bone::setup(dir.path()).unwrap();
        bone.dest("out").src("~/src/*.txt").unwrap();
        (dir, bone)
    }

    #[test]
    fn test_virtual_only_lookup_ignores_real_files() {
        let (_dir, bone) = fixture();

        assert!(bone.exist_file("~/src/a.txt", Lookup::Everywhere));
        assert!(!bone.exist_file("~/src/a.txt", Lookup::VirtualOnly));
        assert!(bone.exist_file("~/out/a.txt", Lookup::VirtualOnly));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let (_dir, bone) = fixture();

        let error = bone.read_file("~/src/missing.txt").unwrap_err();

        assert!(matches!(
            error,
            BoneError::Resolution(ResolutionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_write_without_focus_needs_directory() {
        let (dir, bone) = fixture();

        let error = bone
            .create_write_stream("~/new/file.txt", WriteOptions::default())
            .err()
            .unwrap();
        assert!(matches!(
            error,
            BoneError::WriteTarget(WriteTargetError::MissingDirectory { .. })
        ));

        let mut writer = bone
            .create_write_stream("~/new/file.txt", WriteOptions { focus: true })
            .unwrap();
        writer.write_all(b"x").unwrap();
        drop(writer);
        assert_eq!(fs::read_to_string(dir.path().join("new/file.txt")).unwrap(), "x");
    }

    #[test]
    fn test_refresh_picks_up_new_real_files() {
        let (dir, bone) = fixture();
        assert!(!bone.exist_file("~/out/b.txt", Lookup::Everywhere));

        fs::write(dir.path().join("src/b.txt"), "b").unwrap();
        assert!(!bone.exist_file("~/out/b.txt", Lookup::Everywhere));

        bone.refresh();
        assert!(bone.exist_file("~/out/b.txt", Lookup::Everywhere));
    }

    #[test]
    fn test_read_dir_of_unknown_path_fails() {
        let (_dir, bone) = fixture();

        assert!(bone.read_dir("~/nowhere").is_err());
        assert_eq!(bone.read_dir("~/out").unwrap(), vec!["a.txt"]);
    }
}
