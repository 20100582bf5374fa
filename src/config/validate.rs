// src/config/validate.rs

use std::path::{Component, Path, PathBuf};

use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, StepConfig};
use crate::errors::{DevflowError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DevflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_pipelines(cfg)?;
    validate_names(cfg)?;
    validate_pipelines(cfg)?;
    validate_layout(cfg)?;
    validate_tasks(cfg)?;
    validate_task_graph(cfg)?;
    validate_initial(cfg)?;
    validate_rules(cfg)?;
    Ok(())
}

fn config_error(msg: String) -> DevflowError {
    DevflowError::ConfigError(msg)
}

fn ensure_has_pipelines(cfg: &RawConfigFile) -> Result<()> {
    if cfg.pipeline.is_empty() {
        return Err(config_error(
            "config must contain at least one [pipeline.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_names(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.task.keys() {
        if cfg.pipeline.contains_key(name) {
            return Err(config_error(format!(
                "name '{}' is used by both a pipeline and a task",
                name
            )));
        }
    }
    Ok(())
}

fn check_glob(owner: &str, pattern: &str) -> Result<()> {
    Glob::new(pattern)
        .map(|_| ())
        .map_err(|e| config_error(format!("{owner}: invalid glob pattern '{pattern}': {e}")))
}

fn validate_pipelines(cfg: &RawConfigFile) -> Result<()> {
    for (name, pipeline) in cfg.pipeline.iter() {
        let owner = format!("pipeline '{name}'");
        if pipeline.src.is_empty() {
            return Err(config_error(format!("{owner} has an empty `src` list")));
        }
        for pattern in pipeline.src.iter().chain(pipeline.watch.iter()) {
            check_glob(&owner, pattern)?;
        }
        for step in pipeline.steps.iter() {
            validate_step(&owner, step)?;
        }
    }
    Ok(())
}

fn validate_step(owner: &str, step: &StepConfig) -> Result<()> {
    match step {
        StepConfig::Rename { file, extension } => {
            if file.is_none() && extension.is_none() {
                return Err(config_error(format!(
                    "{owner}: rename step needs `file` or `extension`"
                )));
            }
            if let Some(file) = file {
                if file.is_empty() || file.contains('/') || file.contains('\\') || file == ".." {
                    return Err(config_error(format!(
                        "{owner}: rename `file` must be a plain file name (got '{file}')"
                    )));
                }
            }
        }
        StepConfig::Command { cmd } if cmd.trim().is_empty() => {
            return Err(config_error(format!("{owner}: command step has an empty `cmd`")));
        }
        _ => {}
    }
    Ok(())
}

/// Drop `.` components so that `./dist` and `dist` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// No pipeline may write under any source root, and no source root may live
/// under a destination (its own output would look like new source changes).
fn validate_layout(cfg: &RawConfigFile) -> Result<()> {
    for (dest_owner, d) in cfg.pipeline.iter() {
        let dest = normalize(&d.dest);
        for (src_owner, s) in cfg.pipeline.iter() {
            let root = normalize(&s.root);
            if dest.starts_with(&root) {
                return Err(config_error(format!(
                    "pipeline '{dest_owner}' writes to {:?}, inside the source root {:?} of pipeline '{src_owner}'",
                    d.dest, s.root
                )));
            }
            if root.starts_with(&dest) {
                return Err(config_error(format!(
                    "source root {:?} of pipeline '{src_owner}' lies inside the destination {:?} of pipeline '{dest_owner}'",
                    s.root, d.dest
                )));
            }
        }
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        match (&task.sequence, &task.parallel) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(config_error(format!(
                    "task '{name}' must set exactly one of `sequence` or `parallel`"
                )));
            }
            _ => {}
        }
        if task.children().is_empty() {
            return Err(config_error(format!("task '{name}' has no children")));
        }
        for child in task.children() {
            if !cfg.pipeline.contains_key(child) && !cfg.task.contains_key(child) {
                return Err(config_error(format!(
                    "task '{}' references unknown task '{}'",
                    name, child
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_graph(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: composed task -> child.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.pipeline.keys().chain(cfg.task.keys()) {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for child in task.children() {
            graph.add_edge(name.as_str(), child.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(DevflowError::DagCycle(format!(
                "cycle detected in composed tasks involving '{}'",
                node
            )))
        }
    }
}

fn validate_initial(cfg: &RawConfigFile) -> Result<()> {
    let Some(initial) = &cfg.build.initial else {
        return Ok(());
    };
    if initial.is_empty() {
        return Err(config_error("[build].initial must not be empty".to_string()));
    }
    for name in initial {
        if !cfg.pipeline.contains_key(name) && !cfg.task.contains_key(name) {
            return Err(config_error(format!(
                "[build].initial references unknown task '{}'",
                name
            )));
        }
    }
    Ok(())
}

fn validate_rules(cfg: &RawConfigFile) -> Result<()> {
    for (i, rule) in cfg.rule.iter().enumerate() {
        let owner = format!("rule #{}", i + 1);
        if !cfg.pipeline.contains_key(&rule.task) && !cfg.task.contains_key(&rule.task) {
            return Err(config_error(format!(
                "{owner} references unknown task '{}'",
                rule.task
            )));
        }
        if rule.watch.is_empty() {
            return Err(config_error(format!("{owner} has an empty `watch` list")));
        }
        for pattern in rule.watch.iter().chain(rule.exclude.iter()) {
            check_glob(&owner, pattern)?;
        }
    }
    Ok(())
}
