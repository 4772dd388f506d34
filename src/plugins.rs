//! Built-in plugins and the name registry used by bonefiles.
use indexmap::IndexMap;
use tera::{Context, Tera};

use crate::{
    errors::{BoneError, UsageError},
    pipeline::{make_stage, Options, Plugin, Scope, StageError, StageFactory},
};

fn banner(tag: &str, scope: &Scope, chunk: Vec<u8>) -> Result<Vec<u8>, StageError> {
    let option = scope
        .option
        .defaults(Some(Options::new().with(tag, "anonymous")));
    let who = option.get(tag).unwrap_or("anonymous");

    let mut out = format!("/**\n * @{} {}\n */\n", tag, who).into_bytes();
    out.extend(chunk);
    Ok(out)
}

/// Prepends an `@author` banner; option `author` (default `anonymous`).
pub fn author() -> StageFactory {
    make_stage("author", |scope, chunk| banner("author", scope, chunk))
}

/// Prepends a `@copyright` banner; option `copyright` (default `anonymous`).
pub fn copyright() -> StageFactory {
    make_stage("copyright", |scope, chunk| banner("copyright", scope, chunk))
}

/// [`author`] then [`copyright`], both fed from the same options.
pub fn author_copyright() -> StageFactory {
    StageFactory::compose("author-copyright", [Plugin::from(author()), Plugin::from(copyright())])
}

/// Renders each chunk as a tera template with the options as context.
pub fn template() -> StageFactory {
    make_stage("template", |scope, chunk| {
        let text = String::from_utf8(chunk)?;

        let mut context = Context::new();
        for (key, value) in scope.option.iter() {
            context.insert(key, value);
        }
        context.insert("destination", &scope.info.destination.display().to_string());
        context.insert("source", &scope.info.source.display().to_string());

        let rendered = Tera::one_off(&text, &context, false)?;
        Ok(rendered.into_bytes())
    })
}

/// Plugins addressable by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    factories: IndexMap<String, StageFactory>,
}

impl Registry {
    /// A registry holding the built-in plugins.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for factory in [author(), copyright(), author_copyright(), template()] {
            registry.register(factory);
        }
        registry
    }

    /// Adds `factory` under its name, replacing a previous one.
    pub fn register(&mut self, factory: StageFactory) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Result<&StageFactory, BoneError> {
        self.factories.get(name).ok_or_else(|| {
            UsageError::UnknownPlugin {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FileInfo;

    fn run(plugin: Plugin, input: &str) -> String {
        let mut stage = plugin.instantiate(FileInfo::default(), None);
        String::from_utf8(stage.process(input.as_bytes().to_vec()).unwrap()).unwrap()
    }

    #[test]
    fn test_author_defaults_to_anonymous() {
        let out = run(author().into(), "code");

        assert_eq!(out, "/**\n * @author anonymous\n */\ncode");
    }

    #[test]
    fn test_author_copyright_shares_options() {
        let plugin = author_copyright().configure(
            Options::new()
                .with("author", "wyicwx")
                .with("copyright", "wyicwx"),
        );

        let out = run(plugin, "code");

        assert!(out.contains("@author wyicwx"));
        assert!(out.contains("@copyright wyicwx"));
        assert!(out.find("@copyright").unwrap() < out.find("@author").unwrap());
    }

    #[test]
    fn test_template_renders_options() {
        let plugin = template().configure(Options::new().with("name", "bone"));

        assert_eq!(run(plugin, "hello {{ name }}"), "hello bone");
    }

    #[test]
    fn test_template_error_is_a_stage_error() {
        let mut stage = template()
            .configure(Options::new())
            .instantiate(FileInfo::default(), None);

        let error = stage.process(b"{{ missing".to_vec()).unwrap_err();

        assert!(matches!(error, BoneError::Stage { plugin, .. } if plugin == "template"));
    }

    #[test]
    fn test_unknown_plugin() {
        let registry = Registry::builtin();

        assert!(registry.get("author-copyright").is_ok());
        assert!(matches!(
            registry.get("minify").unwrap_err(),
            BoneError::Usage(UsageError::UnknownPlugin { .. })
        ));
    }
}
