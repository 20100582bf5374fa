// src/watch/rules.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::model::ConfigFile;
use crate::graph::TaskId;
use crate::watch::path_utils::is_under;

/// A path pattern bound to a task.
///
/// Patterns are relative to the watch root, e.g. `"src/css/**/*.css"`.
#[derive(Clone)]
pub struct WatchRule {
    patterns: Vec<String>,
    task: TaskId,
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for WatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRule")
            .field("patterns", &self.patterns)
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

impl WatchRule {
    pub fn new(pattern: &str, task: impl Into<TaskId>) -> Result<Self> {
        Self::with_excludes(&[pattern.to_string()], &[], task)
    }

    pub fn with_excludes(
        patterns: &[String],
        excludes: &[String],
        task: impl Into<TaskId>,
    ) -> Result<Self> {
        let task = task.into();
        let watch_set = build_globset(patterns)
            .with_context(|| format!("building watch globset for task {task}"))?;
        let exclude_set = if excludes.is_empty() {
            None
        } else {
            Some(
                build_globset(excludes)
                    .with_context(|| format!("building exclude globset for task {task}"))?,
            )
        };
        Ok(Self {
            patterns: patterns.to_vec(),
            task,
            watch_set,
            exclude_set,
        })
    }

    pub fn task(&self) -> &TaskId {
        &self.task
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if this rule is interested in `rel_path` (relative to
    /// the watch root).
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

/// All watch rules plus the directories whose events are never routed.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<WatchRule>,
    /// Root-relative prefixes (pipeline destinations).
    ignored: Vec<String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: WatchRule) {
        self.rules.push(rule);
    }

    pub fn ignore_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if !self.ignored.contains(&prefix) {
            self.ignored.push(prefix);
        }
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.ignored.iter().any(|p| is_under(rel_path, p))
    }

    /// Tasks to trigger for a change at `rel_path`, in rule order.
    ///
    /// Every matching rule fires; a task bound by several matching rules is
    /// listed once.
    pub fn tasks_for(&self, rel_path: &str) -> Vec<TaskId> {
        if self.is_ignored(rel_path) {
            return Vec::new();
        }
        let mut tasks: Vec<TaskId> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(rel_path)) {
            if !tasks.contains(&rule.task) {
                tasks.push(rule.task.clone());
            }
        }
        tasks
    }
}

/// Rules from configuration: each pipeline's `watch` globs bound to that
/// pipeline, then every `[[rule]]` in file order.
pub fn rules_from_config(cfg: &ConfigFile) -> Result<Vec<WatchRule>> {
    let mut rules = Vec::new();
    for (name, pipeline) in cfg.pipeline.iter() {
        for pattern in &pipeline.watch {
            rules.push(WatchRule::new(pattern, name.as_str())?);
        }
    }
    for rule in &cfg.rule {
        rules.push(WatchRule::with_excludes(
            &rule.watch,
            &rule.exclude,
            rule.task.as_str(),
        )?);
    }
    Ok(rules)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
