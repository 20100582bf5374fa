#![allow(dead_code)]

use std::path::PathBuf;

use devflow::config::{ConfigFile, PipelineConfig, RawConfigFile, RuleConfig, StepConfig, TaskConfig};
use devflow::errors::Result;
use devflow::types::{FailurePolicy, InitialMode};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_pipeline(mut self, name: &str, pipeline: PipelineConfig) -> Self {
        self.config.pipeline.insert(name.to_string(), pipeline);
        self
    }

    pub fn with_sequence(mut self, name: &str, children: &[&str]) -> Self {
        let task = TaskConfig {
            sequence: Some(children.iter().map(|c| c.to_string()).collect()),
            parallel: None,
        };
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_parallel(mut self, name: &str, children: &[&str]) -> Self {
        let task = TaskConfig {
            sequence: None,
            parallel: Some(children.iter().map(|c| c.to_string()).collect()),
        };
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_rule(mut self, watch: &str, task: &str) -> Self {
        self.config.rule.push(RuleConfig {
            watch: vec![watch.to_string()],
            exclude: vec![],
            task: task.to_string(),
        });
        self
    }

    pub fn with_initial(mut self, names: &[&str]) -> Self {
        self.config.build.initial = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn initial_mode(mut self, mode: InitialMode) -> Self {
        self.config.build.initial_mode = mode;
        self
    }

    pub fn watch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.watch.root = root.into();
        self
    }

    pub fn use_hash(mut self, val: bool) -> Self {
        self.config.watch.use_hash = val;
        self
    }

    /// Serve `base` on ephemeral ports, so tests never collide.
    pub fn serve_ephemeral(mut self, base: impl Into<PathBuf>) -> Self {
        self.config.server.base = base.into();
        self.config.server.port = 0;
        self.config.server.reload_port = 0;
        self
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `PipelineConfig`.
pub struct PipelineConfigBuilder {
    pipeline: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new(root: impl Into<PathBuf>, src: &str, dest: impl Into<PathBuf>) -> Self {
        Self {
            pipeline: PipelineConfig {
                root: root.into(),
                src: vec![src.to_string()],
                dest: dest.into(),
                policy: FailurePolicy::FailFast,
                watch: vec![],
                steps: vec![],
            },
        }
    }

    pub fn src(mut self, pattern: &str) -> Self {
        self.pipeline.src.push(pattern.to_string());
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.pipeline.policy = policy;
        self
    }

    pub fn watch(mut self, pattern: &str) -> Self {
        self.pipeline.watch.push(pattern.to_string());
        self
    }

    pub fn step(mut self, step: StepConfig) -> Self {
        self.pipeline.steps.push(step);
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.pipeline
    }
}
