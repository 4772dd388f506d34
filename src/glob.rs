use regex::Regex;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::{
    errors::{BoneError, FileOperation, IoError, ResolutionError},
    path::to_slash,
};

/// Expands an absolute glob pattern against the real filesystem.
pub trait Glob {
    /// Returns every existing path (files and directories) matching `pattern`,
    /// in a stable order.
    fn expand(&self, pattern: &Path) -> Result<Vec<PathBuf>, BoneError>;
}

/// Returns `true` if `pattern` contains glob syntax.
pub fn has_magic(pattern: &str) -> bool {
    lazy_static::lazy_static! {
        static ref MAGIC_REGEX: Regex = Regex::new(r"[*?\[{]").expect("a valid regex pattern");
    }

    MAGIC_REGEX.is_match(pattern)
}

/// The leading components of `pattern` that contain no glob syntax.
pub fn glob_base(pattern: &Path) -> PathBuf {
    let mut base = PathBuf::new();

    for component in pattern.components() {
        if let Component::Normal(segment) = component {
            if has_magic(&segment.to_string_lossy()) {
                break;
            }
        }
        base.push(component.as_os_str());
    }

    base
}

/// A glob compiled to an anchored regular expression.
///
/// Supports `*`, `?`, `**` (any number of directories), `[...]` classes with
/// `!` negation, and `{a,b}` alternatives.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self, BoneError> {
        let regex =
            Regex::new(&translate(pattern)).map_err(|error| ResolutionError::InvalidGlob {
                pattern: pattern.to_string(),
                source: error,
            })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn from_path(pattern: &Path) -> Result<Self, BoneError> {
        Self::new(&to_slash(pattern))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.regex.is_match(&to_slash(path))
    }
}

fn translate(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut braces = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                if chars.get(i + 1) == Some(&'/') {
                    i += 1;
                    out.push_str("(?:[^/]*/)*");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    if chars[j] == '!' || chars[j] == '^' {
                        out.push('^');
                        j += 1;
                    }
                    push_class_members(&mut out, &chars[j..end]);
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            '{' => {
                braces += 1;
                out.push_str("(?:");
            }
            '}' if braces > 0 => {
                braces -= 1;
                out.push(')');
            }
            ',' if braces > 0 => out.push('|'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    out.push('$');
    out
}

// every member is literal except the `-` between two members of a range, so
// regex class syntax such as `&&`, `--` or `~~` never leaks through
fn push_class_members(out: &mut String, members: &[char]) {
    let mut after_range = false;
    for (k, c) in members.iter().enumerate() {
        if *c == '-' && k > 0 && k + 1 < members.len() && !after_range {
            out.push('-');
            after_range = true;
        } else {
            out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
            after_range = false;
        }
    }
}

// index of the `]` closing the class opened at `start`; a `]` right after
// `[` or `[!` is a literal member
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!') | Some('^')) {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}

/// [`Glob`] over the local filesystem using `walkdir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkGlob;

impl Glob for WalkGlob {
    fn expand(&self, pattern: &Path) -> Result<Vec<PathBuf>, BoneError> {
        let text = to_slash(pattern);

        if !has_magic(&text) {
            return Ok(if pattern.exists() {
                vec![pattern.to_path_buf()]
            } else {
                vec![]
            });
        }

        let base = glob_base(pattern);
        if !base.is_dir() {
            return Ok(vec![]);
        }

        let matcher = GlobPattern::new(&text)?;

        let mut walker = WalkDir::new(&base)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        // without `**` the pattern cannot match below its own depth
        if !text.contains("**") {
            let depth = pattern.components().count() - base.components().count();
            walker = walker.max_depth(depth);
        }

        let mut matches = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(error) => {
                    let path = error.path().unwrap_or(&base).to_path_buf();

                    Err(IoError::new(FileOperation::Walk, path, error.into()))?
                }
            };

            if matcher.matches(entry.path()) {
                matches.push(entry.into_path());
            }
        }

        log::debug!("glob {} matched {} paths", text, matches.len());

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_has_magic() {
        assert!(has_magic("/a/**/*"));
        assert!(has_magic("/a/file.{js,css}"));
        assert!(has_magic("/a/?.js"));
        assert!(!has_magic("/a/hello.js"));
    }

    #[test]
    fn test_glob_base_stops_at_first_magic_component() {
        assert_eq!(
            glob_base(Path::new("/base/src/**/*.js")),
            PathBuf::from("/base/src")
        );
        assert_eq!(
            glob_base(Path::new("/base/src/js/hello.js")),
            PathBuf::from("/base/src/js/hello.js")
        );
    }

    #[test]
    fn test_globstar_matches_any_depth() {
        let glob = GlobPattern::new("/base/src/**/*").unwrap();

        assert!(glob.matches(Path::new("/base/src/js")));
        assert!(glob.matches(Path::new("/base/src/js/hello.js")));
        assert!(glob.matches(Path::new("/base/src/a/b/c.js")));
        assert!(!glob.matches(Path::new("/base/other/a.js")));
    }

    #[test]
    fn test_star_stays_within_one_segment() {
        let glob = GlobPattern::new("/base/src/js/*.js").unwrap();

        assert!(glob.matches(Path::new("/base/src/js/hello.js")));
        assert!(!glob.matches(Path::new("/base/src/js/deep/hello.js")));
        assert!(!glob.matches(Path::new("/base/src/js/hello.css")));
    }

    #[test]
    fn test_classes_and_alternatives() {
        let glob = GlobPattern::new("/b/[!a]?.{js,css}").unwrap();

        assert!(glob.matches(Path::new("/b/bx.js")));
        assert!(glob.matches(Path::new("/b/cy.css")));
        assert!(!glob.matches(Path::new("/b/ax.js")));
        assert!(!glob.matches(Path::new("/b/bx.html")));
    }

    #[test]
    fn test_class_members_are_literal() {
        let glob = GlobPattern::new("/b/[a&&b].js").unwrap();
        assert!(glob.matches(Path::new("/b/&.js")));
        assert!(glob.matches(Path::new("/b/a.js")));
        assert!(!glob.matches(Path::new("/b/c.js")));

        let glob = GlobPattern::new("/b/[~-].js").unwrap();
        assert!(glob.matches(Path::new("/b/~.js")));
        assert!(glob.matches(Path::new("/b/-.js")));

        let glob = GlobPattern::new("/b/[a-c].js").unwrap();
        assert!(glob.matches(Path::new("/b/b.js")));
        assert!(!glob.matches(Path::new("/b/-.js")));
    }

    #[test]
    fn test_literal_dots_are_escaped() {
        let glob = GlobPattern::new("/b/a.js").unwrap();

        assert!(glob.matches(Path::new("/b/a.js")));
        assert!(!glob.matches(Path::new("/b/axjs")));
    }

    #[test]
    fn test_walk_glob_expands_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/js")).unwrap();
        fs::write(root.join("src/js/hello.js"), "hello").unwrap();
        fs::write(root.join("src/readme.md"), "readme").unwrap();

        let all = WalkGlob.expand(&root.join("src/**/*")).unwrap();
        assert_eq!(
            all,
            vec![
                root.join("src/js"),
                root.join("src/js/hello.js"),
                root.join("src/readme.md"),
            ]
        );

        let shallow = WalkGlob.expand(&root.join("src/*.md")).unwrap();
        assert_eq!(shallow, vec![root.join("src/readme.md")]);
    }

    #[test]
    fn test_walk_glob_missing_base_is_empty() {
        let dir = tempfile::tempdir().unwrap();

        let found = WalkGlob.expand(&dir.path().join("nothing/**/*")).unwrap();

        assert!(found.is_empty());
    }
}
