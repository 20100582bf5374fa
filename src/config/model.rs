// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::{FailurePolicy, InitialMode};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// base = "dist"
///
/// [build]
/// initial = ["markup", "styles", "scripts", "images"]
///
/// [pipeline.styles]
/// root = "src/css"
/// src = ["*.css"]
/// dest = "dist/css"
/// policy = "log-and-continue"
/// watch = ["src/css/**/*.css"]
/// steps = [{ kind = "css" }, { kind = "source-map" }]
///
/// [task.assets]
/// parallel = ["styles", "scripts", "images"]
///
/// [[rule]]
/// watch = ["src/partials/**"]
/// task = "assets"
/// ```
///
/// All sections except `[pipeline.*]` are optional and have defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub watch: WatchSection,

    /// Pipelines from `[pipeline.<name>]`, keyed by name.
    #[serde(default)]
    pub pipeline: BTreeMap<String, PipelineConfig>,

    /// Composed tasks from `[task.<name>]`, keyed by name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Extra watch rules from `[[rule]]`.
    #[serde(default)]
    pub rule: Vec<RuleConfig>,
}

/// Validated configuration. Only constructed through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub build: BuildSection,
    pub watch: WatchSection,
    pub pipeline: BTreeMap<String, PipelineConfig>,
    pub task: BTreeMap<String, TaskConfig>,
    pub rule: Vec<RuleConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            server: raw.server,
            build: raw.build,
            watch: raw.watch,
            pipeline: raw.pipeline,
            task: raw.task,
            rule: raw.rule,
        }
    }

    /// Names of the tasks making up the initial build, in order.
    ///
    /// Without an explicit `[build].initial` every pipeline runs, in name order.
    pub fn initial_tasks(&self) -> Vec<String> {
        match &self.build.initial {
            Some(names) => names.clone(),
            None => self.pipeline.keys().cloned().collect(),
        }
    }

    /// Whether `name` refers to a pipeline or a composed task.
    pub fn has_task(&self, name: &str) -> bool {
        self.pipeline.contains_key(name) || self.task.contains_key(name)
    }

    /// Destination directories of all pipelines.
    pub fn destinations(&self) -> Vec<PathBuf> {
        self.pipeline.values().map(|p| p.dest.clone()).collect()
    }

    /// Resolve every relative path against `root` (the project directory).
    pub fn rooted_at(mut self, root: &Path) -> Self {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        join(&mut self.server.base);
        join(&mut self.watch.root);
        for pipeline in self.pipeline.values_mut() {
            join(&mut pipeline.root);
            join(&mut pipeline.dest);
        }
        self
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Directory served over HTTP.
    #[serde(default = "default_base")]
    pub base: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port; `0` picks an ephemeral port. A busy port is retried on the
    /// next few ports.
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket port for reload notifications; `0` picks an ephemeral port.
    #[serde(default = "default_reload_port")]
    pub reload_port: u16,

    /// Inject the reload client script into served HTML.
    #[serde(default = "default_true")]
    pub inject_client: bool,
}

fn default_base() -> PathBuf {
    PathBuf::from("dist")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_reload_port() -> u16 {
    35729
}

fn default_true() -> bool {
    true
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base: default_base(),
            host: default_host(),
            port: default_port(),
            reload_port: default_reload_port(),
            inject_client: true,
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BuildSection {
    /// Tasks run by the initial build, in order.
    #[serde(default)]
    pub initial: Option<Vec<String>>,

    #[serde(default)]
    pub initial_mode: InitialMode,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Directory observed recursively; watch patterns are relative to it.
    #[serde(default = "default_watch_root")]
    pub root: PathBuf,

    /// Only trigger when the changed file's content hash actually changed.
    #[serde(default)]
    pub use_hash: bool,
}

fn default_watch_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            root: default_watch_root(),
            use_hash: false,
        }
    }
}

/// `[pipeline.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Source root; `src` patterns are relative to it and relative paths
    /// below it are preserved under `dest`.
    pub root: PathBuf,

    /// Source globs, relative to `root`.
    pub src: Vec<String>,

    pub dest: PathBuf,

    #[serde(default)]
    pub policy: FailurePolicy,

    /// Watch globs (relative to `[watch].root`) that re-run this pipeline.
    #[serde(default)]
    pub watch: Vec<String>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// One transform step, e.g. `{ kind = "rename", file = "build.js" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepConfig {
    Copy,
    Css,
    Banner {
        text: String,
    },
    Rename {
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        extension: Option<String>,
    },
    SourceMap,
    Command {
        cmd: String,
    },
}

impl StepConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StepConfig::Copy => "copy",
            StepConfig::Css => "css",
            StepConfig::Banner { .. } => "banner",
            StepConfig::Rename { .. } => "rename",
            StepConfig::SourceMap => "source-map",
            StepConfig::Command { .. } => "command",
        }
    }
}

/// `[task.<name>]` section: exactly one of `sequence` / `parallel`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    #[serde(default)]
    pub sequence: Option<Vec<String>>,

    #[serde(default)]
    pub parallel: Option<Vec<String>>,
}

impl TaskConfig {
    /// Names of the child tasks, whichever combinator is used.
    pub fn children(&self) -> &[String] {
        self.sequence
            .as_deref()
            .or(self.parallel.as_deref())
            .unwrap_or(&[])
    }
}

/// `[[rule]]` entry: bind extra watch globs to any task.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub watch: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    pub task: String,
}
