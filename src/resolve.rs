//! Overlay resolution: deciding whether a path is produced by a virtual
//! definition or falls through to the real filesystem.
use indexmap::IndexSet;
use std::path::{Path, PathBuf};

use crate::{
    errors::{BoneError, ResolutionError},
    glob::{glob_base, has_magic, GlobPattern},
    graph::{Definition, DefinitionId, Folder, RenameRule},
    path::{normalize, to_slash},
    Bone,
};

/// Upper bound on nested resolutions before giving up.
pub const MAX_DEPTH: usize = 64;

/// Outcome of [`Bone::locate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// No definition produces the path; the real filesystem decides.
    Real(PathBuf),
    Virtual(VirtualHit),
}

/// The definition producing a virtual path and the file it derives from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHit {
    pub folder: PathBuf,
    pub definition: DefinitionId,
    /// Matched source; may itself be virtual.
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Resolved {
    pub fn is_virtual(&self) -> bool {
        matches!(self, Resolved::Virtual(_))
    }
}

/// A file a definition draws from and its path relative to the pattern's base.
struct Source {
    path: PathBuf,
    relative: PathBuf,
}

/// Paths and folders currently being resolved, so that definitions reading
/// from each other cannot recurse forever.
#[derive(Debug, Default)]
pub(crate) struct Walk {
    targets: Vec<PathBuf>,
    folders: Vec<PathBuf>,
}

impl Walk {
    fn check_depth(&self, path: &Path) -> Result<(), BoneError> {
        if self.targets.len() + self.folders.len() >= MAX_DEPTH {
            Err(ResolutionError::TooDeep {
                path: path.to_path_buf(),
                limit: MAX_DEPTH,
            })?
        }
        Ok(())
    }

    pub(crate) fn enter(&mut self, target: &Path) {
        self.targets.push(target.to_path_buf());
    }

    pub(crate) fn leave(&mut self) {
        self.targets.pop();
    }
}

/// Where `relative` lands inside `folder` once the file name is renamed.
fn destination_for(folder: &Path, rename: Option<&RenameRule>, relative: &Path) -> Option<PathBuf> {
    let name = relative.file_name()?.to_string_lossy();
    let renamed = match rename {
        Some(rule) => rule.apply(&name),
        None => name.to_string(),
    };
    let parent = relative.parent().unwrap_or_else(|| Path::new(""));

    Some(normalize(&folder.join(parent).join(renamed)))
}

impl Bone {
    /// Resolves `path` against the virtual folders, newest definition first.
    pub fn locate(&self, path: &str) -> Result<Resolved, BoneError> {
        let target = self.paths.resolve(path, None);

        self.locate_in(&target, &mut Walk::default())
    }

    pub(crate) fn locate_in(&self, target: &Path, walk: &mut Walk) -> Result<Resolved, BoneError> {
        // a definition needing its own output as input produces nothing
        if walk.targets.iter().any(|seen| seen == target) {
            return Ok(Resolved::Real(target.to_path_buf()));
        }
        walk.check_depth(target)?;

        walk.enter(target);
        let found = self.find_producer(target, walk);
        walk.leave();

        found
    }

    fn find_producer(&self, target: &Path, walk: &mut Walk) -> Result<Resolved, BoneError> {
        for (folder, definition) in self.graph.candidates(target) {
            if let Some(source) = self.producing_source(folder, definition, target, walk)? {
                log::debug!(
                    "{} is virtual: definition #{} in {} from {}",
                    target.display(),
                    definition.created_at(),
                    folder.path().display(),
                    source.display()
                );

                return Ok(Resolved::Virtual(VirtualHit {
                    folder: folder.path().to_path_buf(),
                    definition: definition.id(),
                    source,
                    destination: target.to_path_buf(),
                }));
            }
        }

        Ok(Resolved::Real(target.to_path_buf()))
    }

    /// The source `definition` would turn into `target`, if any.
    fn producing_source(
        &self,
        folder: &Folder,
        definition: &Definition,
        target: &Path,
        walk: &mut Walk,
    ) -> Result<Option<PathBuf>, BoneError> {
        if let Some(RenameRule::Literal(name)) = definition.rename() {
            if normalize(&folder.path().join(name)) != target {
                return Ok(None);
            }
            let sources = self.definition_sources(definition, walk)?;

            return Ok(single_source(folder, definition, sources).map(|source| source.path));
        }

        for pattern in definition.patterns() {
            if has_magic(&to_slash(pattern)) {
                for source in self.expand_glob(pattern, walk)? {
                    let destination =
                        destination_for(folder.path(), definition.rename(), &source.relative);
                    if destination.as_deref() == Some(target) {
                        return Ok(Some(source.path));
                    }
                }
            } else {
                let Some(name) = pattern.file_name() else {
                    continue;
                };
                let destination =
                    destination_for(folder.path(), definition.rename(), Path::new(name));
                if destination.as_deref() == Some(target) && self.source_exists(pattern, walk)? {
                    return Ok(Some(pattern.to_path_buf()));
                }
            }
        }

        Ok(None)
    }

    /// Every existing file the patterns of `definition` name, explicit paths first.
    fn definition_sources(
        &self,
        definition: &Definition,
        walk: &mut Walk,
    ) -> Result<Vec<Source>, BoneError> {
        let mut seen = IndexSet::new();
        let mut sources = Vec::new();

        for pattern in definition.patterns() {
            if has_magic(&to_slash(pattern)) {
                for source in self.expand_glob(pattern, walk)? {
                    if seen.insert(source.path.clone()) {
                        sources.push(source);
                    }
                }
            } else if self.source_exists(pattern, walk)? && seen.insert(pattern.to_path_buf()) {
                let Some(name) = pattern.file_name() else {
                    continue;
                };
                sources.push(Source {
                    path: pattern.to_path_buf(),
                    relative: PathBuf::from(name),
                });
            } else {
                log::debug!("{} does not resolve to a file", pattern.display());
            }
        }

        Ok(sources)
    }

    fn source_exists(&self, path: &Path, walk: &mut Walk) -> Result<bool, BoneError> {
        Ok(match self.locate_in(path, walk)? {
            Resolved::Virtual(_) => true,
            Resolved::Real(real) => self.disk.is_file(&real),
        })
    }

    /// Real files matching `pattern` unioned with the virtual files matching it.
    fn expand_glob(&self, pattern: &Path, walk: &mut Walk) -> Result<Vec<Source>, BoneError> {
        let base = glob_base(pattern);
        let mut files = IndexSet::new();

        for path in self.real_glob(pattern)? {
            if self.disk.is_file(&path) {
                files.insert(path);
            }
        }
        files.extend(self.virtual_matches(pattern, walk)?);

        Ok(files
            .into_iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(&base).ok()?.to_path_buf();
                Some(Source { path, relative })
            })
            .collect())
    }

    /// Real glob expansion, cached until [`Bone::refresh`].
    pub(crate) fn real_glob(&self, pattern: &Path) -> Result<Vec<PathBuf>, BoneError> {
        if let Some(cached) = self.globs.borrow().get(pattern) {
            return Ok(cached.clone());
        }

        let found = self.glob.expand(pattern)?;
        self.globs
            .borrow_mut()
            .insert(pattern.to_path_buf(), found.clone());

        Ok(found)
    }

    /// Virtual files, across all folders, whose path matches `pattern`.
    pub(crate) fn virtual_matches(
        &self,
        pattern: &Path,
        walk: &mut Walk,
    ) -> Result<Vec<PathBuf>, BoneError> {
        let matcher = GlobPattern::from_path(pattern)?;
        let base = glob_base(pattern);
        let mut found = IndexSet::new();

        for folder in self.graph.folders() {
            if !folder.path().starts_with(&base) && !base.starts_with(folder.path()) {
                continue;
            }
            for destination in self.folder_outputs(folder, walk)? {
                if matcher.matches(&destination) {
                    found.insert(destination);
                }
            }
        }

        Ok(found.into_iter().collect())
    }

    /// Paths produced by the definitions of `folder` itself, deduplicated.
    fn folder_outputs(&self, folder: &Folder, walk: &mut Walk) -> Result<Vec<PathBuf>, BoneError> {
        if walk.folders.iter().any(|seen| seen == folder.path()) {
            return Ok(Vec::new());
        }
        walk.check_depth(folder.path())?;

        walk.folders.push(folder.path().to_path_buf());
        let outputs = self.collect_outputs(folder, walk);
        walk.folders.pop();

        outputs
    }

    fn collect_outputs(&self, folder: &Folder, walk: &mut Walk) -> Result<Vec<PathBuf>, BoneError> {
        let mut outputs = IndexSet::new();

        for definition in folder.definitions().iter().rev() {
            let sources = self.definition_sources(definition, walk)?;

            if let Some(RenameRule::Literal(name)) = definition.rename() {
                if single_source(folder, definition, sources).is_some() {
                    outputs.insert(normalize(&folder.path().join(name)));
                }
                continue;
            }

            for source in sources {
                if let Some(destination) =
                    destination_for(folder.path(), definition.rename(), &source.relative)
                {
                    outputs.insert(destination);
                }
            }
        }

        Ok(outputs.into_iter().collect())
    }
}

// a literal rename names exactly one file; anything else produces nothing
fn single_source(folder: &Folder, definition: &Definition, sources: Vec<Source>) -> Option<Source> {
    let count = sources.len();
    let mut sources = sources.into_iter();

    match (sources.next(), count) {
        (Some(only), 1) => Some(only),
        (None, _) => None,
        _ => {
            log::warn!(
                "definition #{} in {} renames {} files to one literal name; skipping it",
                definition.created_at(),
                folder.path().display(),
                count
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, Bone) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/js")).unwrap();
        fs::write(root.join("src/js/hello.js"), "hello").unwrap();
        fs::write(root.join("src/js/world.js"), "world").unwrap();

        let bone = Bone::setup(root).unwrap();
        (dir, bone)
    }

    #[test]
    fn test_unknown_paths_are_real() {
        let (_dir, bone) = fixture();

        let resolved = bone.locate("~/src/js/hello.js").unwrap();

        assert_eq!(resolved, Resolved::Real(bone.base().join("src/js/hello.js")));
    }

    #[test]
    fn test_glob_keeps_relative_structure() {
        let (_dir, mut bone) = fixture();
        bone.dest("dist").src("~/src/**/*").unwrap();

        match bone.locate("~/dist/js/world.js").unwrap() {
            Resolved::Virtual(hit) => {
                assert_eq!(hit.source, bone.base().join("src/js/world.js"));
                assert_eq!(hit.folder, bone.base().join("dist"));
            }
            other => panic!("expected a virtual hit, got {:?}", other),
        }
    }

    #[test]
    fn test_newest_definition_wins() {
        let (_dir, mut bone) = fixture();
        bone.dest("out").src("~/src/js/hello.js").unwrap().rename("x.js").unwrap();
        bone.dest("out").src("~/src/js/world.js").unwrap().rename("x.js").unwrap();

        match bone.locate("~/out/x.js").unwrap() {
            Resolved::Virtual(hit) => assert_eq!(hit.source, bone.base().join("src/js/world.js")),
            other => panic!("expected a virtual hit, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_rename_over_many_files_produces_nothing() {
        let (_dir, mut bone) = fixture();
        bone.dest("out").src("~/src/js/*.js").unwrap().rename("all.js").unwrap();

        assert!(!bone.locate("~/out/all.js").unwrap().is_virtual());
        assert!(!bone.locate("~/out/hello.js").unwrap().is_virtual());
    }

    #[test]
    fn test_chained_folders_resolve_through_each_other() {
        let (_dir, mut bone) = fixture();
        bone.dest("dist").src("~/src/**/*").unwrap();
        bone.dest("dist").dest("js").src("./hello.js").unwrap().rename("a.js").unwrap();
        bone.dest("dist").dest("js").src("./a.js").unwrap().rename("b.js").unwrap();
        bone.dest("cdist").src("~/dist/**/*").unwrap();

        match bone.locate("~/cdist/js/b.js").unwrap() {
            Resolved::Virtual(hit) => assert_eq!(hit.source, bone.base().join("dist/js/b.js")),
            other => panic!("expected a virtual hit, got {:?}", other),
        }
    }

    #[test]
    fn test_self_referencing_definitions_terminate() {
        let (_dir, mut bone) = fixture();
        bone.dest("loop").src("./a.js").unwrap().rename("b.js").unwrap();
        bone.dest("loop").src("./b.js").unwrap().rename("a.js").unwrap();
        bone.dest("mirror").src("~/mirror/**/*").unwrap();

        assert!(!bone.locate("~/loop/a.js").unwrap().is_virtual());
        assert!(!bone.locate("~/mirror/x.js").unwrap().is_virtual());
    }

    // `hop1` reads `src/js`, every further `hopN` reads `hop(N-1)`
    fn chain(bone: &mut Bone, hops: usize) {
        bone.dest("hop1").src("~/src/js/*.js").unwrap();
        for n in 2..=hops {
            bone.dest(&format!("hop{}", n))
                .src(format!("~/hop{}/*.js", n - 1))
                .unwrap();
        }
    }

    #[test]
    fn test_long_chains_resolve_below_the_depth_limit() {
        let (_dir, mut bone) = fixture();
        chain(&mut bone, 20);

        match bone.locate("~/hop20/hello.js").unwrap() {
            Resolved::Virtual(hit) => assert_eq!(hit.source, bone.base().join("hop19/hello.js")),
            other => panic!("expected a virtual hit, got {:?}", other),
        }
        assert_eq!(bone.read_file("~/hop20/hello.js").unwrap(), b"hello");
    }

    #[test]
    fn test_chains_past_the_depth_limit_fail() {
        let (_dir, mut bone) = fixture();
        chain(&mut bone, MAX_DEPTH + 16);
        let last = format!("~/hop{}/hello.js", MAX_DEPTH + 16);

        match bone.locate(&last).unwrap_err() {
            BoneError::Resolution(ResolutionError::TooDeep { limit, .. }) => {
                assert_eq!(limit, MAX_DEPTH)
            }
            other => panic!("expected TooDeep, got {:?}", other),
        }
        assert!(matches!(
            bone.read_file(&last).unwrap_err(),
            BoneError::Resolution(ResolutionError::TooDeep { .. })
        ));
        assert!(!bone.exist_file(&last, crate::fs::Lookup::Everywhere));
    }
}
