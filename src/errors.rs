use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::StageError;

#[derive(Debug, Error, Diagnostic)]
pub enum FileOperation {
    #[error("reading a file")]
    Read,
    #[error("writing a file")]
    Write,
    #[error("creating a directory")]
    Mkdir,
    #[error("removing a path")]
    Remove,
    #[error("renaming a file")]
    Rename,
    #[error("listing a directory")]
    ReadDir,
    #[error("walking a directory tree")]
    Walk,
}
#[derive(Debug, Error, Diagnostic)]
#[error("I/O error: {operation} on path '{path}'")]
#[diagnostic(
    code(bone::io),
    help("Check file permissions, disk space, or that the path is correct.")
)]
pub struct IoError {
    pub operation: FileOperation,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
impl IoError {
    pub fn new(operation: FileOperation, path: PathBuf, error: std::io::Error) -> Self {
        Self {
            operation,
            path,
            source: error,
        }
    }
}

/// Malformed calls into the builder or the descriptor layer.
#[derive(Debug, Error, Diagnostic)]
pub enum UsageError {
    #[error("src() expects a string or an array of strings, got {found}")]
    #[diagnostic(code(bone::usage::invalid_patterns))]
    InvalidPatterns { found: String },

    #[error("src() was given no usable pattern")]
    #[diagnostic(
        code(bone::usage::empty_patterns),
        help("Pass at least one non-empty path or glob pattern")
    )]
    EmptyPatterns,

    #[error("rename() expects a string or a function, got {found}")]
    #[diagnostic(code(bone::usage::invalid_rename))]
    InvalidRename { found: String },

    #[error("{operation}() called before src()")]
    #[diagnostic(
        code(bone::usage::no_active_definition),
        help("Call src() on this builder to create a definition first")
    )]
    NoActiveDefinition { operation: &'static str },

    #[error("no plugin registered under the name '{name}'")]
    #[diagnostic(code(bone::usage::unknown_plugin))]
    UnknownPlugin { name: String },

    #[error("invalid rename pattern '{pattern}'")]
    #[diagnostic(code(bone::usage::invalid_rename_pattern))]
    InvalidRenamePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A path that resolves neither virtually nor on disk, or a walk that cannot finish.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolutionError {
    #[error("no virtual definition or real file at '{path}'")]
    #[diagnostic(code(bone::resolution::not_found))]
    NotFound { path: PathBuf },

    #[error("'{path}' is neither a real nor a virtual directory")]
    #[diagnostic(code(bone::resolution::not_a_directory))]
    NotADirectory { path: PathBuf },

    #[error("resolving '{path}' nested deeper than {limit} virtual folders")]
    #[diagnostic(
        code(bone::resolution::too_deep),
        help("Check for virtual folders that read from each other")
    )]
    TooDeep { path: PathBuf, limit: usize },

    #[error("invalid glob pattern '{pattern}'")]
    #[diagnostic(code(bone::resolution::invalid_glob))]
    InvalidGlob {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum WriteTargetError {
    #[error("cannot write '{path}': directory '{dir}' does not exist")]
    #[diagnostic(
        code(bone::write::missing_directory),
        help("Create the directory first or pass `focus: true`")
    )]
    MissingDirectory { path: PathBuf, dir: PathBuf },

    #[error("cannot create directory '{dir}' for '{path}'")]
    #[diagnostic(code(bone::write::create_directory))]
    CreateDirectory {
        path: PathBuf,
        dir: PathBuf,
        #[source]
        source: IoError,
    },
}

#[derive(Debug, Error, Diagnostic)]
#[error("Parsing error: bonefile '{path}'")]
#[diagnostic(code(bone::parse), help("Review the bonefile"))]
pub struct ParseError {
    pub path: PathBuf,
    #[source]
    pub source: toml::de::Error,
}
impl ParseError {
    pub fn new(path: PathBuf, error: toml::de::Error) -> Self {
        Self {
            path,
            source: error,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum BoneError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    WriteTarget(#[from] WriteTargetError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error("plugin '{plugin}' failed")]
    #[diagnostic(code(bone::stage))]
    Stage {
        plugin: String,
        #[source]
        source: StageError,
    },

    #[error("virtual folders depend on each other: {folders:?}")]
    #[diagnostic(
        code(bone::cycle),
        help("A folder cannot read from a folder that reads from it")
    )]
    Cycle { folders: Vec<PathBuf> },
}

impl BoneError {
    /// Recovers the error a pipeline smuggled through `std::io::Read`, or wraps
    /// a plain I/O failure.
    pub(crate) fn from_stream(error: std::io::Error, operation: FileOperation, path: &Path) -> Self {
        let carries_bone = error
            .get_ref()
            .is_some_and(|inner| inner.is::<BoneError>());

        if !carries_bone {
            return IoError::new(operation, path.to_path_buf(), error).into();
        }

        let kind = error.kind();
        match error.into_inner().map(|inner| inner.downcast::<BoneError>()) {
            Some(Ok(inner)) => *inner,
            _ => IoError::new(operation, path.to_path_buf(), kind.into()).into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BoneError::Resolution(ResolutionError::NotFound { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stream_recovers_bone_error() {
        let original = BoneError::from(ResolutionError::NotFound {
            path: PathBuf::from("/base/missing.js"),
        });
        let wrapped = std::io::Error::other(original);

        let recovered = BoneError::from_stream(wrapped, FileOperation::Read, Path::new("/x"));

        assert!(recovered.is_not_found());
    }

    #[test]
    fn test_from_stream_wraps_plain_io_error() {
        let plain = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");

        let wrapped = BoneError::from_stream(plain, FileOperation::Read, Path::new("/x"));

        match wrapped {
            BoneError::Io(IoError { path, .. }) => assert_eq!(path, PathBuf::from("/x")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
