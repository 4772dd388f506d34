//! Transform stages: single-chunk functions turned into configurable,
//! composable stream stages.
//!
//! A [`StageFactory`] wraps a function. Configuring it with [`Options`] gives a
//! [`Plugin`], which is what a definition's pipeline stores. Each file read
//! instantiates fresh [`Stage`]s from the plugins and drives them with a
//! [`PipelineReader`].
use indexmap::IndexMap;
use std::{
    fmt,
    io::{self, Read},
    path::PathBuf,
    sync::Arc,
};

use crate::errors::BoneError;

/// Error type plugin functions return.
pub type StageError = Box<dyn std::error::Error + Send + Sync>;

type TransformFn = dyn Fn(&Scope, Vec<u8>) -> Result<Vec<u8>, StageError> + Send + Sync;

/// Largest chunk handed to a stage at once.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Key/value options a plugin was configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options(IndexMap<String, String>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Merges these options over `defaults` (or over nothing). Keys set here
    /// always win over the defaults.
    ///
    /// ```
    /// use bone::Options;
    ///
    /// let configured = Options::new().with("author", "wyicwx");
    /// let merged = configured.defaults(Some(
    ///     Options::new().with("author", "anonymous").with("year", "2014"),
    /// ));
    ///
    /// assert_eq!(merged.get("author"), Some("wyicwx"));
    /// assert_eq!(merged.get("year"), Some("2014"));
    /// ```
    pub fn defaults(&self, defaults: Option<Options>) -> Options {
        let mut merged = defaults.unwrap_or_default();
        merged.layer(self);
        merged
    }

    fn layer(&mut self, other: &Options) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// What a stage knows about the file flowing through it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Virtual path being produced.
    pub destination: PathBuf,
    /// Path the definition matched; may itself be virtual.
    pub source: PathBuf,
}

/// Per-invocation context handed to a stage function.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub option: Options,
    pub info: FileInfo,
    /// Real file the bytes were originally read from.
    pub source: Option<PathBuf>,
}

/// A transform function that can be configured into [`Plugin`]s.
#[derive(Clone)]
pub struct StageFactory {
    name: String,
    run: Arc<TransformFn>,
}

/// Wraps `transform` into a [`StageFactory`].
///
/// `transform` is called once per chunk, in arrival order, and must return the
/// bytes to pass downstream or an error that aborts the pipeline.
///
/// ```
/// use bone::{make_stage, Options};
///
/// let shout = make_stage("shout", |scope, chunk| {
///     let option = scope.option.defaults(Some(Options::new().with("suffix", "!")));
///     let mut text = String::from_utf8(chunk)?.to_uppercase();
///     text.push_str(option.get("suffix").unwrap_or_default());
///     Ok(text.into_bytes())
/// });
///
/// let mut stage = shout.configure(Options::new()).instantiate(Default::default(), None);
/// assert_eq!(stage.process(b"hi".to_vec()).unwrap(), b"HI!".to_vec());
/// ```
pub fn make_stage<F>(name: &str, transform: F) -> StageFactory
where
    F: Fn(&Scope, Vec<u8>) -> Result<Vec<u8>, StageError> + Send + Sync + 'static,
{
    StageFactory {
        name: name.to_string(),
        run: Arc::new(transform),
    }
}

impl StageFactory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configure(&self, option: Options) -> Plugin {
        Plugin {
            name: self.name.clone(),
            run: Arc::clone(&self.run),
            option,
        }
    }

    /// Fuses `parts` into one factory.
    ///
    /// Each invocation runs the parts in order. A part sees the outer scope's
    /// `info` and `source`, and options built from the outer options with the
    /// part's own options layered on top. The first failing part aborts the
    /// invocation.
    pub fn compose<I>(name: &str, parts: I) -> StageFactory
    where
        I: IntoIterator<Item = Plugin>,
    {
        let parts: Vec<Plugin> = parts.into_iter().collect();

        make_stage(name, move |scope, chunk| {
            let mut data = chunk;
            for part in &parts {
                let mut option = scope.option.defaults(None);
                option.layer(&part.option);

                let inner = Scope {
                    option,
                    info: scope.info.clone(),
                    source: scope.source.clone(),
                };
                data = (part.run)(&inner, data)?;
            }
            Ok(data)
        })
    }
}

impl fmt::Debug for StageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageFactory")
            .field("name", &self.name)
            .finish()
    }
}

/// A configured [`StageFactory`].
#[derive(Clone)]
pub struct Plugin {
    name: String,
    run: Arc<TransformFn>,
    option: Options,
}

impl Plugin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn option(&self) -> &Options {
        &self.option
    }

    /// Creates a stage bound to one file.
    pub fn instantiate(&self, info: FileInfo, source: Option<PathBuf>) -> Stage {
        Stage {
            name: self.name.clone(),
            run: Arc::clone(&self.run),
            scope: Scope {
                option: self.option.clone(),
                info,
                source,
            },
        }
    }
}

/// A bare factory behaves as if configured with no options.
impl From<StageFactory> for Plugin {
    fn from(factory: StageFactory) -> Self {
        factory.configure(Options::new())
    }
}

impl From<&StageFactory> for Plugin {
    fn from(factory: &StageFactory) -> Self {
        factory.configure(Options::new())
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("option", &self.option)
            .finish()
    }
}

/// A plugin instance processing the chunks of a single file.
pub struct Stage {
    name: String,
    run: Arc<TransformFn>,
    scope: Scope,
}

impl Stage {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn process(&mut self, chunk: Vec<u8>) -> Result<Vec<u8>, BoneError> {
        (self.run)(&self.scope, chunk).map_err(|source| BoneError::Stage {
            plugin: self.name.clone(),
            source,
        })
    }
}

/// Pulls chunks from `inner` and pushes each through every stage in order.
///
/// Nothing is read from `inner` until the consumer asks for bytes. A stage
/// failure is returned as an `io::Error` wrapping the [`BoneError`] and ends
/// the stream.
pub struct PipelineReader<R> {
    inner: R,
    stages: Vec<Stage>,
    pending: Vec<u8>,
    offset: usize,
    finished: bool,
}

impl<R: Read> PipelineReader<R> {
    pub fn new(inner: R, stages: Vec<Stage>) -> Self {
        Self {
            inner,
            stages,
            pending: Vec::new(),
            offset: 0,
            finished: false,
        }
    }

    fn pull(&mut self) -> io::Result<()> {
        let mut chunk = vec![0; CHUNK_SIZE];
        let read = self.inner.read(&mut chunk)?;

        if read == 0 {
            self.finished = true;
            return Ok(());
        }
        chunk.truncate(read);

        let mut data = chunk;
        for stage in &mut self.stages {
            data = match stage.process(data) {
                Ok(output) => output,
                Err(error) => {
                    self.finished = true;
                    return Err(io::Error::other(error));
                }
            };
        }

        self.pending = data;
        self.offset = 0;

        Ok(())
    }
}

impl<R: Read> Read for PipelineReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.offset < self.pending.len() {
                let available = &self.pending[self.offset..];
                let count = available.len().min(buf.len());
                buf[..count].copy_from_slice(&available[..count]);
                self.offset += count;
                return Ok(count);
            }

            if self.finished || buf.is_empty() {
                return Ok(0);
            }

            self.pull()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> StageFactory {
        make_stage("prefix", |scope, chunk| {
            let option = scope.option.defaults(Some(Options::new().with("text", "[default]")));
            let mut out = option.get("text").unwrap_or_default().as_bytes().to_vec();
            out.extend(chunk);
            Ok(out)
        })
    }

    fn record(key: &'static str) -> StageFactory {
        make_stage(key, move |scope, mut chunk| {
            let value = scope.option.get(key).unwrap_or("unset");
            chunk.extend(format!("|{}={}", key, value).into_bytes());
            Ok(chunk)
        })
    }

    fn run(plugin: &Plugin, input: &[u8]) -> Result<Vec<u8>, BoneError> {
        let mut stage = plugin.instantiate(FileInfo::default(), None);
        stage.process(input.to_vec())
    }

    #[test]
    fn test_options_defaults_keep_configured_keys() {
        let option = Options::new().with("author", "wyicwx");

        let merged = option.defaults(Some(Options::new().with("author", "anonymous")));
        assert_eq!(merged.get("author"), Some("wyicwx"));

        let fresh = option.defaults(None);
        assert_eq!(fresh, option);
    }

    #[test]
    fn test_bare_factory_uses_its_defaults() {
        let plugin: Plugin = prefix().into();

        assert_eq!(run(&plugin, b"body").unwrap(), b"[default]body".to_vec());
    }

    #[test]
    fn test_configured_factory_overrides_defaults() {
        let plugin = prefix().configure(Options::new().with("text", "> "));

        assert_eq!(run(&plugin, b"body").unwrap(), b"> body".to_vec());
    }

    #[test]
    fn test_compose_runs_parts_in_order() {
        let fused = StageFactory::compose(
            "both",
            [
                prefix().configure(Options::new().with("text", "1")),
                prefix().configure(Options::new().with("text", "2")),
            ],
        );

        assert_eq!(run(&fused.into(), b"x").unwrap(), b"21x".to_vec());
    }

    #[test]
    fn test_compose_cascades_outer_options_inward() {
        let fused = StageFactory::compose(
            "cascade",
            [
                record("author").configure(Options::new().with("author", "inner")),
                record("copyright").into(),
            ],
        );
        let plugin = fused.configure(
            Options::new()
                .with("author", "outer")
                .with("copyright", "outer"),
        );

        let output = String::from_utf8(run(&plugin, b"").unwrap()).unwrap();

        assert_eq!(output, "|author=inner|copyright=outer");
    }

    #[test]
    fn test_compose_propagates_info_and_source() {
        let describe = make_stage("describe", |scope, _| {
            Ok(format!(
                "{}<-{}<-{}",
                scope.info.destination.display(),
                scope.info.source.display(),
                scope.source.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
            )
            .into_bytes())
        });
        let fused = StageFactory::compose("outer", [describe.into()]);
        let info = FileInfo {
            destination: PathBuf::from("/b/dist/a.js"),
            source: PathBuf::from("/b/src/a.js"),
        };

        let mut stage = Plugin::from(fused).instantiate(info, Some(PathBuf::from("/b/raw.js")));

        assert_eq!(
            stage.process(vec![]).unwrap(),
            b"/b/dist/a.js<-/b/src/a.js<-/b/raw.js".to_vec()
        );
    }

    #[test]
    fn test_compose_aborts_on_first_error() {
        let fail = make_stage("fail", |_, _| Err("broken input".into()));
        let fused = StageFactory::compose("abort", [fail.into(), prefix().into()]);

        match run(&fused.into(), b"x") {
            Err(BoneError::Stage { plugin, .. }) => assert_eq!(plugin, "abort"),
            other => panic!("expected a stage error, got {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_reader_on_empty_source_ends_immediately() {
        let stage = prefix().configure(Options::new()).instantiate(FileInfo::default(), None);
        let mut reader = PipelineReader::new(io::empty(), vec![stage]);

        let mut out = Vec::new();
        let read = reader.read_to_end(&mut out).unwrap();

        assert_eq!(read, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_pipeline_reader_transforms_every_chunk() {
        let input = vec![b'a'; CHUNK_SIZE + 10];
        let count = make_stage("count", |_, chunk| Ok(format!("{};", chunk.len()).into_bytes()));
        let stage = count.configure(Options::new()).instantiate(FileInfo::default(), None);
        let mut reader = PipelineReader::new(io::Cursor::new(input), vec![stage]);

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();

        assert_eq!(out, format!("{};10;", CHUNK_SIZE));
    }

    #[test]
    fn test_pipeline_reader_surfaces_stage_errors() {
        let fail = make_stage("fail", |_, _| Err("nope".into()));
        let stage = fail.configure(Options::new()).instantiate(FileInfo::default(), None);
        let mut reader = PipelineReader::new(io::Cursor::new(b"data".to_vec()), vec![stage]);

        let error = reader.read_to_end(&mut Vec::new()).unwrap_err();
        let inner = error.get_ref().and_then(|e| e.downcast_ref::<BoneError>());

        assert!(matches!(inner, Some(BoneError::Stage { .. })));
    }
}
