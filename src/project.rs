//! Projects and materialization of virtual folders onto disk.
use bone_toposort::{sort, Graph as DependencyGraph, SortError};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{
    errors::{BoneError, FileOperation},
    fs::{Lookup, WriteOptions},
    glob::{glob_base, has_magic},
    path::to_slash,
    transactions::{Active, RollbackOperation, Transaction},
    Bone,
};

impl Bone {
    /// Files, real or virtual, that make up the project `name`.
    ///
    /// A project registered with [`Bone::register_project`] lists its glob;
    /// any other name lists everything below the folder of that name.
    pub fn project(&self, name: &str) -> Result<Vec<PathBuf>, BoneError> {
        let pattern = self.project_pattern(name);
        log::debug!("project '{}' -> {}", name, pattern.display());

        let files = self
            .search_path(&pattern, Lookup::Everywhere)?
            .into_iter()
            .filter(|path| self.exist_path(path, Lookup::Everywhere))
            .collect();

        Ok(files)
    }

    /// Writes every virtual file below `folder` to disk and returns their paths.
    ///
    /// Stops at the first failure and removes what this call created.
    pub fn build(&self, folder: &str) -> Result<Vec<PathBuf>, BoneError> {
        let root = self.paths.resolve(folder, None);
        self.build_path(&root)
    }

    /// Builds every root folder, folders read by others first.
    pub fn build_all(&self) -> Result<Vec<PathBuf>, BoneError> {
        let mut written = Vec::new();
        for folder in self.build_order()? {
            written.extend(self.build_path(&folder)?);
        }

        Ok(written)
    }

    fn build_path(&self, root: &Path) -> Result<Vec<PathBuf>, BoneError> {
        let files = self.virtual_files(root)?;
        log::info!("building {} ({} files)", root.display(), files.len());

        let mut trx = Transaction::<Active>::new(self.disk.as_ref());
        for file in &files {
            self.write_out(&mut trx, file)?;
        }
        trx.commit();

        Ok(files)
    }

    /// Streams `file` into a sibling staging file and renames it into place,
    /// so a virtual file that reads its own path sees the old content to the
    /// end. An existing target is kept as a backup until the build commits.
    fn write_out(&self, trx: &mut Transaction<'_, Active>, file: &Path) -> Result<(), BoneError> {
        let mut reader = self.open_path(file)?;

        if let Some(missing) = file.parent().and_then(|dir| self.topmost_missing(dir)) {
            trx.add_operation(RollbackOperation::RemoveDir(missing));
        }

        let staging = sibling(file, "bone-staging");
        trx.add_operation(RollbackOperation::RemoveFile(staging.clone()));
        {
            let mut writer = self.create_path(&staging, WriteOptions { focus: true })?;
            io::copy(&mut reader, &mut writer)
                .map_err(|error| BoneError::from_stream(error, FileOperation::Write, file))?;
            writer
                .flush()
                .map_err(|error| BoneError::from_stream(error, FileOperation::Write, file))?;
        }
        drop(reader);

        if self.disk.is_file(file) {
            let backup = sibling(file, "bone-backup");
            self.disk.rename(file, &backup)?;
            trx.add_operation(RollbackOperation::Restore {
                backup,
                path: file.to_path_buf(),
            });
        } else {
            trx.add_operation(RollbackOperation::RemoveFile(file.to_path_buf()));
        }
        self.disk.rename(&staging, file)?;
        log::debug!("wrote {}", file.display());

        Ok(())
    }

    fn topmost_missing(&self, dir: &Path) -> Option<PathBuf> {
        let mut missing = None;
        let mut current = Some(dir);
        while let Some(dir) = current {
            if self.disk.is_dir(dir) {
                break;
            }
            missing = Some(dir.to_path_buf());
            current = dir.parent();
        }

        missing
    }

    /// Root folders ordered so that a folder comes after every folder its
    /// patterns read from.
    fn build_order(&self) -> Result<Vec<PathBuf>, BoneError> {
        let roots: Vec<PathBuf> = self
            .graph
            .folders()
            .map(|folder| folder.path())
            .filter(|path| {
                !self
                    .graph
                    .folders()
                    .any(|other| other.path() != *path && path.starts_with(other.path()))
            })
            .map(Path::to_path_buf)
            .collect();

        let root_of = |path: &Path| roots.iter().find(|root| path.starts_with(root)).cloned();

        let mut dependencies = DependencyGraph::new();
        for root in &roots {
            dependencies.add_node(root.clone());
        }
        for folder in self.graph.folders() {
            let Some(reader) = root_of(folder.path()) else {
                continue;
            };
            for definition in folder.definitions() {
                for pattern in definition.patterns() {
                    let read = if has_magic(&to_slash(pattern)) {
                        glob_base(pattern)
                    } else {
                        pattern.to_path_buf()
                    };
                    match root_of(&read) {
                        Some(source) if source != reader => {
                            dependencies.add_edge(source, reader.clone());
                        }
                        _ => {}
                    }
                }
            }
        }

        sort(&dependencies).map_err(|error| match error {
            SortError::CycleDetected { unresolved } => BoneError::Cycle {
                folders: unresolved,
            },
        })
    }
}

// `dir/.name.suffix` next to `file`
fn sibling(file: &Path, suffix: &str) -> PathBuf {
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    file.with_file_name(format!(".{}.{}", name, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, Bone) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/js")).unwrap();
        fs::write(dir.path().join("src/js/a.js"), "a").unwrap();

        let bone = Bone::setup(dir.path()).unwrap();
        (dir, bone)
    }

    #[test]
    fn test_build_writes_virtual_files() {
        let (dir, mut bone) = fixture();
        bone.dest("dist").src("~/src/**/*").unwrap();

        let written = bone.build("~/dist").unwrap();

        assert_eq!(written, vec![dir.path().join("dist/js/a.js")]);
        assert_eq!(fs::read_to_string(dir.path().join("dist/js/a.js")).unwrap(), "a");
    }

    #[test]
    fn test_build_order_follows_reads() {
        let (_dir, mut bone) = fixture();
        bone.dest("late").src("~/early/**/*").unwrap();
        bone.dest("early").src("~/src/**/*").unwrap();

        let order = bone.build_order().unwrap();

        assert_eq!(
            order,
            vec![bone.base().join("early"), bone.base().join("late")]
        );
    }

    #[test]
    fn test_mutual_reads_are_a_cycle() {
        let (_dir, mut bone) = fixture();
        bone.dest("one").src("~/two/**/*").unwrap();
        bone.dest("two").src("~/one/**/*").unwrap();

        assert!(matches!(
            bone.build_order().unwrap_err(),
            BoneError::Cycle { .. }
        ));
    }
}
