// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::model::ConfigFile;
use crate::engine::RuntimeEvent;
use crate::errors::{DevflowError, Result, WatchSetupError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::TaskId;
use crate::watch::event_handler::EventContext;
use crate::watch::hash::ContentHashes;
use crate::watch::path_utils::relative_str;
use crate::watch::rules::{RuleSet, WatchRule, rules_from_config};

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive; dropping it stops
/// file watching.
pub struct WatcherHandle {
    root: PathBuf,
    _inner: RecommendedWatcher,
}

impl WatcherHandle {
    /// The canonical directory being observed.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .finish()
    }
}

/// Binds path patterns to tasks and turns matching filesystem changes into
/// `RuntimeEvent::TaskTriggered`.
///
/// The controller never runs anything itself.
#[derive(Debug)]
pub struct WatchController {
    root: PathBuf,
    rules: Vec<WatchRule>,
    ignored: Vec<PathBuf>,
    use_hash: bool,
}

impl WatchController {
    /// A controller observing `root` recursively; patterns are relative to it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rules: Vec::new(),
            ignored: Vec::new(),
            use_hash: false,
        }
    }

    /// Rules, ignored destinations and hashing as configured.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut controller = Self::new(&cfg.watch.root).with_hashing(cfg.watch.use_hash);
        for rule in rules_from_config(cfg)? {
            controller.add_rule(rule);
        }
        for dest in cfg.destinations() {
            controller.ignore_under(dest);
        }
        Ok(controller)
    }

    pub fn with_hashing(mut self, use_hash: bool) -> Self {
        self.use_hash = use_hash;
        self
    }

    /// Bind `pattern` to `task`.
    pub fn register(&mut self, pattern: &str, task: impl Into<TaskId>) -> Result<()> {
        let rule = WatchRule::new(pattern, task)
            .map_err(|e| DevflowError::ConfigError(format!("{e:#}")))?;
        self.add_rule(rule);
        Ok(())
    }

    pub fn add_rule(&mut self, rule: WatchRule) {
        debug!(patterns = ?rule.patterns(), task = %rule.task(), "registered watch rule");
        self.rules.push(rule);
    }

    /// Never route events for paths under `dir` (a pipeline destination).
    pub fn ignore_under(&mut self, dir: impl Into<PathBuf>) {
        self.ignored.push(dir.into());
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// Compile the rule set against the canonical `root`.
    fn rule_set(&self, root: &Path) -> RuleSet {
        let mut set = RuleSet::new();
        for rule in &self.rules {
            set.push(rule.clone());
        }
        for dir in &self.ignored {
            let dir = if dir.is_relative() { self.root.join(dir) } else { dir.clone() };
            match relative_str(root, &dir).or_else(|| relative_str(&self.root, &dir)) {
                Some(rel) if !rel.is_empty() => set.ignore_prefix(rel),
                Some(_) => warn!(dir = ?dir, "destination is the watch root; not ignoring it"),
                None => debug!(dir = ?dir, "destination outside the watch root"),
            }
        }
        set
    }

    /// Start observing the root and forwarding triggers to `runtime_tx`.
    pub fn start(
        self,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> std::result::Result<WatcherHandle, WatchSetupError> {
        let setup_error = |message: String| WatchSetupError {
            root: self.root.clone(),
            message,
        };

        if !self.root.is_dir() {
            return Err(setup_error("not a directory".to_string()));
        }
        // Canonicalize once so we have a stable base path.
        let root = self
            .root
            .canonicalize()
            .map_err(|e| setup_error(e.to_string()))?;

        let rules = Arc::new(self.rule_set(&root));

        // Channel from the blocking notify callback into the async world.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Err(err) = event_tx.send(event) {
                        warn!("failed to forward notify event: {err}");
                    }
                }
                Err(err) => warn!("file watch error: {err}"),
            },
            Config::default(),
        )
        .map_err(|e| setup_error(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| setup_error(e.to_string()))?;

        info!(rules = rules.rules().len(), "file watcher started on {:?}", root);

        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let mut ctx = EventContext {
            root: root.clone(),
            rules,
            hashes: self.use_hash.then(ContentHashes::new),
            fs,
            runtime_tx,
        };

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(?event, "received notify event");
                if !ctx.handle_event(event).await {
                    break;
                }
            }
            debug!("watcher event loop finished");
        });

        Ok(WatcherHandle {
            root,
            _inner: watcher,
        })
    }
}
