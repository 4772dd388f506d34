use indexmap::IndexMap;
use regex::Regex;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    errors::{BoneError, UsageError},
    glob::has_magic,
    path::{to_slash, PathResolver},
    pipeline::Plugin,
};

/// Identifies a [`Definition`] for the lifetime of its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u64);

/// How a definition names the files it produces.
#[derive(Clone)]
pub enum RenameRule {
    /// Replacement name; applies only when the definition yields exactly one file.
    Literal(String),
    /// Maps each original file name to a new one.
    Map(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl RenameRule {
    pub fn map<F>(rename: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Map(Arc::new(rename))
    }

    /// Rewrites file names with a regular expression, `$1`-style groups allowed.
    pub fn regex(pattern: &str, replace: &str) -> Result<Self, BoneError> {
        let regex = Regex::new(pattern).map_err(|error| UsageError::InvalidRenamePattern {
            pattern: pattern.to_string(),
            source: error,
        })?;
        let replace = replace.to_string();

        Ok(Self::map(move |name| {
            regex.replace(name, replace.as_str()).into_owned()
        }))
    }

    pub fn apply(&self, name: &str) -> String {
        match self {
            Self::Literal(literal) => literal.clone(),
            Self::Map(rename) => rename(name),
        }
    }
}

impl fmt::Debug for RenameRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(name) => f.debug_tuple("Literal").field(name).finish(),
            Self::Map(_) => f.write_str("Map(..)"),
        }
    }
}

/// Argument types accepted by [`Dest::src`].
pub trait IntoPatterns {
    fn into_patterns(self) -> Result<Vec<String>, BoneError>;
}

/// Argument types accepted by [`Dest::rename`].
pub trait IntoRename {
    fn into_rename(self) -> Result<RenameRule, BoneError>;
}

fn collect_patterns<I>(entries: I) -> Result<Vec<String>, BoneError>
where
    I: IntoIterator<Item = Option<String>>,
{
    let patterns: Vec<String> = entries
        .into_iter()
        .flatten()
        .filter(|pattern| !pattern.trim().is_empty())
        .collect();

    if patterns.is_empty() {
        Err(UsageError::EmptyPatterns)?
    }

    Ok(patterns)
}

impl IntoPatterns for &str {
    fn into_patterns(self) -> Result<Vec<String>, BoneError> {
        collect_patterns([Some(self.to_string())])
    }
}

impl IntoPatterns for String {
    fn into_patterns(self) -> Result<Vec<String>, BoneError> {
        collect_patterns([Some(self)])
    }
}

impl IntoPatterns for &[&str] {
    fn into_patterns(self) -> Result<Vec<String>, BoneError> {
        collect_patterns(self.iter().map(|pattern| Some(pattern.to_string())))
    }
}

impl<const N: usize> IntoPatterns for [&str; N] {
    fn into_patterns(self) -> Result<Vec<String>, BoneError> {
        collect_patterns(self.iter().map(|pattern| Some(pattern.to_string())))
    }
}

impl IntoPatterns for Vec<&str> {
    fn into_patterns(self) -> Result<Vec<String>, BoneError> {
        self.as_slice().into_patterns()
    }
}

impl IntoPatterns for Vec<String> {
    fn into_patterns(self) -> Result<Vec<String>, BoneError> {
        collect_patterns(self.into_iter().map(Some))
    }
}

/// Missing entries are skipped; a list with nothing else is rejected.
impl IntoPatterns for Vec<Option<&str>> {
    fn into_patterns(self) -> Result<Vec<String>, BoneError> {
        collect_patterns(self.into_iter().map(|entry| entry.map(str::to_string)))
    }
}

/// Dynamic values from a bonefile: a string or an array of strings.
impl IntoPatterns for toml::Value {
    fn into_patterns(self) -> Result<Vec<String>, BoneError> {
        match self {
            toml::Value::String(pattern) => collect_patterns([Some(pattern)]),
            toml::Value::Array(entries) => {
                let mut patterns = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry {
                        toml::Value::String(pattern) => patterns.push(Some(pattern)),
                        other => Err(UsageError::InvalidPatterns {
                            found: format!("an array holding a {}", other.type_str()),
                        })?,
                    }
                }
                collect_patterns(patterns)
            }
            other => Err(UsageError::InvalidPatterns {
                found: format!("a {}", other.type_str()),
            })?,
        }
    }
}

impl IntoRename for &str {
    fn into_rename(self) -> Result<RenameRule, BoneError> {
        Ok(RenameRule::Literal(self.to_string()))
    }
}

impl IntoRename for String {
    fn into_rename(self) -> Result<RenameRule, BoneError> {
        Ok(RenameRule::Literal(self))
    }
}

impl IntoRename for RenameRule {
    fn into_rename(self) -> Result<RenameRule, BoneError> {
        Ok(self)
    }
}

impl IntoRename for toml::Value {
    fn into_rename(self) -> Result<RenameRule, BoneError> {
        match self {
            toml::Value::String(name) => Ok(RenameRule::Literal(name)),
            other => Err(UsageError::InvalidRename {
                found: format!("a {}", other.type_str()),
            })?,
        }
    }
}

/// One `src()` rule of a folder.
#[derive(Debug, Clone)]
pub struct Definition {
    id: DefinitionId,
    patterns: Vec<PathBuf>,
    rename: Option<RenameRule>,
    pipeline: Vec<Plugin>,
}

impl Definition {
    pub fn id(&self) -> DefinitionId {
        self.id
    }

    /// Insertion sequence number; newer definitions override older ones.
    pub fn created_at(&self) -> u64 {
        self.id.0
    }

    /// Absolute patterns, explicit paths first, then globs, each group in
    /// declaration order.
    pub fn patterns(&self) -> impl Iterator<Item = &Path> {
        let explicit = self
            .patterns
            .iter()
            .filter(|pattern| !has_magic(&to_slash(pattern)));
        let globs = self
            .patterns
            .iter()
            .filter(|pattern| has_magic(&to_slash(pattern)));

        explicit.chain(globs).map(PathBuf::as_path)
    }

    pub fn rename(&self) -> Option<&RenameRule> {
        self.rename.as_ref()
    }

    pub fn pipeline(&self) -> &[Plugin] {
        &self.pipeline
    }
}

/// A virtual output folder and its definitions in insertion order.
#[derive(Debug, Clone)]
pub struct Folder {
    path: PathBuf,
    definitions: Vec<Definition>,
}

impl Folder {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }
}

/// Every virtual folder, keyed by absolute path.
#[derive(Debug, Default)]
pub struct Graph {
    folders: IndexMap<PathBuf, Folder>,
    sequence: u64,
}

impl Graph {
    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.values()
    }

    pub fn folder(&self, path: &Path) -> Option<&Folder> {
        self.folders.get(path)
    }

    pub fn definition(&self, folder: &Path, id: DefinitionId) -> Option<&Definition> {
        self.folder(folder)?
            .definitions
            .iter()
            .find(|definition| definition.id == id)
    }

    /// Definitions of every folder strictly above `target`, newest first.
    pub fn candidates(&self, target: &Path) -> Vec<(&Folder, &Definition)> {
        let mut candidates: Vec<(&Folder, &Definition)> = self
            .folders
            .values()
            .filter(|folder| target != folder.path && target.starts_with(&folder.path))
            .flat_map(|folder| {
                folder
                    .definitions
                    .iter()
                    .map(move |definition| (folder, definition))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.id.cmp(&a.1.id));
        candidates
    }

    fn ensure_folder(&mut self, path: &Path) {
        if !self.folders.contains_key(path) {
            log::debug!("declaring virtual folder {}", path.display());
            self.folders.insert(
                path.to_path_buf(),
                Folder {
                    path: path.to_path_buf(),
                    definitions: Vec::new(),
                },
            );
        }
    }

    fn push(&mut self, folder: &Path, patterns: Vec<PathBuf>) -> DefinitionId {
        self.ensure_folder(folder);
        self.sequence += 1;
        let id = DefinitionId(self.sequence);

        if let Some(entry) = self.folders.get_mut(folder) {
            entry.definitions.push(Definition {
                id,
                patterns,
                rename: None,
                pipeline: Vec::new(),
            });
        }

        id
    }

    fn definition_mut(&mut self, folder: &Path, id: DefinitionId) -> Option<&mut Definition> {
        self.folders
            .get_mut(folder)?
            .definitions
            .iter_mut()
            .find(|definition| definition.id == id)
    }

    fn remove(&mut self, folder: &Path, id: DefinitionId) {
        if let Some(entry) = self.folders.get_mut(folder) {
            entry.definitions.retain(|definition| definition.id != id);
        }
    }
}

/// Fluent builder scoped to one virtual folder.
///
/// `src` creates a definition and makes it the active one; `rename`, `act`
/// and `destroy` operate on the active definition and fail without one.
pub struct Dest<'a> {
    graph: &'a mut Graph,
    paths: &'a PathResolver,
    folder: PathBuf,
    active: Option<DefinitionId>,
}

impl<'a> Dest<'a> {
    pub(crate) fn new(graph: &'a mut Graph, paths: &'a PathResolver, folder: PathBuf) -> Self {
        graph.ensure_folder(&folder);

        Self {
            graph,
            paths,
            folder,
            active: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.folder
    }

    /// Builder for a folder nested under this one.
    pub fn dest(&mut self, sub: &str) -> Dest<'_> {
        let folder = self.paths.resolve_in(sub, &self.folder);

        Dest::new(self.graph, self.paths, folder)
    }

    /// Adds a definition whose patterns resolve relative to this folder.
    pub fn src<P: IntoPatterns>(&mut self, patterns: P) -> Result<&mut Self, BoneError> {
        let patterns = patterns
            .into_patterns()?
            .iter()
            .map(|pattern| self.paths.resolve_in(pattern, &self.folder))
            .collect();

        let id = self.graph.push(&self.folder, patterns);
        self.active = Some(id);

        Ok(self)
    }

    pub fn rename<R: IntoRename>(&mut self, rule: R) -> Result<&mut Self, BoneError> {
        let id = self.require_active("rename")?;
        let rule = rule.into_rename()?;

        if let Some(definition) = self.graph.definition_mut(&self.folder, id) {
            definition.rename = Some(rule);
        }

        Ok(self)
    }

    /// Appends `plugin` to the active definition's pipeline.
    pub fn act<P: Into<Plugin>>(&mut self, plugin: P) -> Result<&mut Self, BoneError> {
        let id = self.require_active("act")?;

        if let Some(definition) = self.graph.definition_mut(&self.folder, id) {
            definition.pipeline.push(plugin.into());
        }

        Ok(self)
    }

    /// Removes the active definition from its folder.
    pub fn destroy(&mut self) -> Result<&mut Self, BoneError> {
        let id = self.require_active("destroy")?;

        self.graph.remove(&self.folder, id);
        self.active = None;

        Ok(self)
    }

    fn require_active(&self, operation: &'static str) -> Result<DefinitionId, BoneError> {
        match self.active {
            Some(id) => Ok(id),
            None => Err(UsageError::NoActiveDefinition { operation })?,
        }
    }
}
