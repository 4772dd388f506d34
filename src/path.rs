use std::path::{Component, Path, PathBuf};

/// Prefix that stands for the base directory given to [`crate::Bone::setup`].
pub const BASE_ALIAS: char = '~';

/// Resolves the path strings used by build scripts into absolute paths.
///
/// The base directory is fixed at construction; there is no setter.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base: PathBuf,
}

impl PathResolver {
    /// `base` must already be absolute; it is normalized here.
    pub fn new(base: &Path) -> Self {
        Self {
            base: normalize(base),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolves `path` following the alias rules:
    ///
    /// - `\` separators become `/`
    /// - `~`, `~/rest` and `~rest` resolve under the base directory
    /// - `/...` is already absolute
    /// - anything else is relative to `base` (itself resolved with these rules)
    ///   or to the base directory when `base` is `None`
    pub fn resolve(&self, path: &str, base: Option<&str>) -> PathBuf {
        let path = path.replace('\\', "/");

        if let Some(rest) = path.strip_prefix(BASE_ALIAS) {
            return normalize(&self.base.join(rest.trim_start_matches('/')));
        }

        if path.starts_with('/') {
            return normalize(Path::new(&path));
        }

        let dir = match base {
            Some(base) => self.resolve(base, None),
            None => self.base.clone(),
        };

        normalize(&dir.join(path))
    }

    /// Like [`PathResolver::resolve`] with an already absolute directory as base.
    pub fn resolve_in(&self, path: &str, dir: &Path) -> PathBuf {
        let path = path.replace('\\', "/");

        if path.starts_with(BASE_ALIAS) || path.starts_with('/') {
            return self.resolve(&path, None);
        }

        normalize(&dir.join(path))
    }
}

/// Lexically removes `.` and `..` components. `..` never climbs above the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            // Skip the current-dir marker "."
            Component::CurDir => {}

            // For "..", pop the last component if possible
            Component::ParentDir => {
                normalized.pop();
            }

            // Roots, prefixes and normal components are kept
            other => normalized.push(other.as_os_str()),
        }
    }

    normalized
}

/// Renders a path with forward slashes for matching and display.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
