//! Virtual build folders.
//!
//! A [`Bone`] holds a graph of virtual folders whose files are computed on
//! demand from real files, glob patterns or other virtual folders, optionally
//! transformed by plugins and renamed. Reads go through the overlay resolver
//! first and fall back to the real filesystem.
//!
//! ```no_run
//! use bone::{plugins, Bone, Options};
//!
//! let mut bone = Bone::setup("./project")?;
//! bone.dest("dist").src("~/src/**/*")?;
//! bone.dest("dist")
//!     .dest("js")
//!     .src("~/src/js/hello.js")?
//!     .act(plugins::author().configure(Options::new().with("author", "me")))?
//!     .rename("main.js")?;
//!
//! let main = bone.read_file("~/dist/js/main.js")?;
//! # Ok::<(), bone::BoneError>(())
//! ```
use indexmap::IndexMap;
use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Path, PathBuf},
};

pub mod api;
pub mod config;
pub mod disk;
pub mod errors;
pub mod fs;
pub mod glob;
pub mod graph;
pub mod path;
pub mod pipeline;
pub mod plugins;
pub mod preview;
pub mod project;
pub mod resolve;
mod transactions;

pub use disk::{Disk, LocalDisk};
pub use errors::BoneError;
pub use fs::{Lookup, WriteOptions};
pub use glob::{Glob, WalkGlob};
pub use graph::{Dest, RenameRule};
pub use pipeline::{make_stage, FileInfo, Options, Plugin, Scope, StageFactory};
pub use resolve::Resolved;

use crate::{
    errors::{FileOperation, IoError},
    graph::Graph,
    path::PathResolver,
};

/// The virtual folder graph together with the capabilities it resolves against.
///
/// Definitions are registered through `&mut self` ([`Bone::dest`]); reads only
/// need `&self`.
pub struct Bone {
    paths: PathResolver,
    graph: Graph,
    glob: Box<dyn Glob>,
    disk: Box<dyn Disk>,
    // real glob expansions, dropped by `refresh`
    globs: RefCell<HashMap<PathBuf, Vec<PathBuf>>>,
    projects: IndexMap<String, PathBuf>,
}

impl Bone {
    /// Creates a graph rooted at `base`, resolved against the working directory,
    /// using the local filesystem.
    pub fn setup<P: AsRef<Path>>(base: P) -> Result<Self, BoneError> {
        let base = base.as_ref();
        let base = if base.is_absolute() {
            base.to_path_buf()
        } else {
            let cwd = std::env::current_dir()
                .map_err(|error| IoError::new(FileOperation::Read, base.to_path_buf(), error))?;
            cwd.join(base)
        };

        Ok(Self::with_capabilities(&base, WalkGlob, LocalDisk))
    }

    /// Creates a graph rooted at the absolute path `base` with custom capabilities.
    pub fn with_capabilities<G, D>(base: &Path, glob: G, disk: D) -> Self
    where
        G: Glob + 'static,
        D: Disk + 'static,
    {
        let paths = PathResolver::new(base);
        log::debug!("bone base directory: {}", paths.base().display());

        Self {
            paths,
            graph: Graph::default(),
            glob: Box::new(glob),
            disk: Box::new(disk),
            globs: RefCell::new(HashMap::new()),
            projects: IndexMap::new(),
        }
    }

    /// Returns the builder for the virtual folder at `folder`, declaring it if needed.
    pub fn dest(&mut self, folder: &str) -> Dest<'_> {
        let folder = self.paths.resolve(folder, None);

        Dest::new(&mut self.graph, &self.paths, folder)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Records the glob `pattern` under which [`Bone::project`] lists `name`.
    pub fn register_project(&mut self, name: &str, pattern: &str) {
        let pattern = self.paths.resolve(pattern, None);
        self.projects.insert(name.to_string(), pattern);
    }

    pub(crate) fn project_pattern(&self, name: &str) -> PathBuf {
        match self.projects.get(name) {
            Some(pattern) => pattern.clone(),
            None => self.paths.resolve(name, None).join("**/*"),
        }
    }
}
