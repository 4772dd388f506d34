//! `Bonefile.toml`: virtual folders declared as data.
use indexmap::IndexMap;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    errors::{BoneError, FileOperation, IoError, ParseError, UsageError},
    graph::{IntoRename, RenameRule},
    path::normalize,
    pipeline::Options,
    plugins::Registry,
    Bone,
};

pub const DEFAULT_BONEFILE: &str = "Bonefile.toml";

#[derive(Debug, Deserialize)]
pub struct Bonefile {
    /// Base directory, relative to the bonefile.
    pub base: Option<PathBuf>,
    #[serde(default)]
    pub dest: Vec<DestEntry>,
    /// Project name to glob pattern.
    #[serde(default)]
    pub project: IndexMap<String, String>,
    #[serde(skip)]
    dir: PathBuf,
}

/// One `[[dest]]` table, the equivalent of `dest(folder).src(src)...`.
#[derive(Debug, Deserialize)]
pub struct DestEntry {
    pub folder: String,
    pub src: toml::Value,
    pub rename: Option<toml::Value>,
    #[serde(default)]
    pub act: Vec<ActEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ActEntry {
    pub plugin: String,
    #[serde(default)]
    pub options: IndexMap<String, toml::Value>,
}

impl Bonefile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BoneError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|error| IoError::new(FileOperation::Read, path.to_path_buf(), error))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Self::parse(&content, path, dir)
    }

    /// Parses `content`; `dir` anchors a relative `base`.
    pub fn parse(content: &str, origin: &Path, dir: PathBuf) -> Result<Self, BoneError> {
        let mut parsed: Bonefile = toml::from_str(content)
            .map_err(|error| ParseError::new(origin.to_path_buf(), error))?;
        parsed.dir = dir;

        Ok(parsed)
    }

    pub fn base(&self) -> PathBuf {
        match &self.base {
            Some(base) => normalize(&self.dir.join(base)),
            None => self.dir.clone(),
        }
    }

    /// Builds the graph the bonefile describes, taking plugins from `registry`.
    pub fn apply(&self, registry: &Registry) -> Result<Bone, BoneError> {
        let mut bone = Bone::setup(self.base())?;

        for entry in &self.dest {
            let mut folder = bone.dest(&entry.folder);
            let definition = folder.src(entry.src.clone())?;

            if let Some(rule) = &entry.rename {
                definition.rename(rename_rule(rule)?)?;
            }
            for act in &entry.act {
                let factory = registry.get(&act.plugin)?;
                definition.act(factory.configure(options(&act.options)))?;
            }
        }
        log::debug!("loaded {} definitions", self.dest.len());

        for (name, pattern) in &self.project {
            bone.register_project(name, pattern);
        }

        Ok(bone)
    }
}

fn options(values: &IndexMap<String, toml::Value>) -> Options {
    values
        .iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.as_str(), value)
        })
        .collect()
}

fn text<'a>(table: &'a toml::Table, key: &str) -> Option<&'a str> {
    table.get(key).and_then(toml::Value::as_str)
}

/// A string, `{ pattern, replace }` (regex) or `{ prefix, suffix }`.
fn rename_rule(value: &toml::Value) -> Result<RenameRule, BoneError> {
    let toml::Value::Table(table) = value else {
        return value.clone().into_rename();
    };

    if let Some(pattern) = text(table, "pattern") {
        return RenameRule::regex(pattern, text(table, "replace").unwrap_or_default());
    }

    let prefix = text(table, "prefix");
    let suffix = text(table, "suffix");
    if prefix.is_none() && suffix.is_none() {
        Err(UsageError::InvalidRename {
            found: "a table without pattern, prefix or suffix".to_string(),
        })?
    }

    let prefix = prefix.unwrap_or_default().to_string();
    let suffix = suffix.unwrap_or_default().to_string();
    Ok(RenameRule::map(move |name| format!("{}{}{}", prefix, name, suffix)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Lookup;

    fn parse(content: &str, dir: &Path) -> Bonefile {
        Bonefile::parse(content, &dir.join(DEFAULT_BONEFILE), dir.to_path_buf()).unwrap()
    }

    #[test]
    fn test_bonefile_declares_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.js"), "a").unwrap();

        let bonefile = parse(
            r#"
            [[dest]]
            folder = "dist"
            src = ["~/src/*.js"]
            rename = { prefix = "min." }
            act = [{ plugin = "author", options = { author = "me" } }]

            [project]
            dist = "~/dist/**/*"
            "#,
            dir.path(),
        );
        let bone = bonefile.apply(&Registry::builtin()).unwrap();

        assert!(bone.exist_file("~/dist/min.a.js", Lookup::VirtualOnly));
        let content = bone.read_file("~/dist/min.a.js").unwrap();
        assert_eq!(content, b"/**\n * @author me\n */\na".to_vec());
        assert_eq!(bone.project("dist").unwrap(), vec![dir.path().join("dist/min.a.js")]);
    }

    #[test]
    fn test_regex_rename() {
        let value: toml::Value =
            toml::from_str("pattern = '\\.js$'\nreplace = '.min.js'").unwrap();
        let rule = rename_rule(&value).unwrap();

        assert_eq!(rule.apply("a.js"), "a.min.js");
    }

    #[test]
    fn test_invalid_values_are_usage_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bonefile = parse("[[dest]]\nfolder = \"dist\"\nsrc = 3\n", dir.path());

        assert!(matches!(
            bonefile.apply(&Registry::builtin()).err().unwrap(),
            BoneError::Usage(UsageError::InvalidPatterns { .. })
        ));

        let bonefile = parse(
            "[[dest]]\nfolder = \"dist\"\nsrc = \"a.js\"\nact = [{ plugin = \"minify\" }]\n",
            dir.path(),
        );
        assert!(matches!(
            bonefile.apply(&Registry::builtin()).err().unwrap(),
            BoneError::Usage(UsageError::UnknownPlugin { .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_BONEFILE);
        std::fs::write(&path, "[[dest]\n").unwrap();

        assert!(matches!(
            Bonefile::from_file(&path).unwrap_err(),
            BoneError::Parse(_)
        ));
    }

    #[test]
    fn test_base_is_relative_to_bonefile() {
        let dir = tempfile::tempdir().unwrap();
        let bonefile = parse("base = \"site\"\n", dir.path());

        assert_eq!(bonefile.base(), dir.path().join("site"));
    }
}
