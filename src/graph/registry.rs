// src/graph/registry.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::model::ConfigFile;
use crate::errors::{DevflowError, Result};
use crate::fs::FileSystem;
use crate::graph::task::Task;
use crate::pipeline::Pipeline;

/// Named tasks: one leaf per pipeline plus every configured composed task.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every pipeline and composed task named in `cfg`.
    ///
    /// Composed tasks are built children-first, so each one holds the very
    /// same child nodes the registry hands out by name.
    pub fn from_config(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let mut registry = Self::new();

        for (name, pcfg) in cfg.pipeline.iter() {
            let pipeline = Pipeline::from_config(name, pcfg, Arc::clone(&fs))?;
            registry.insert(Task::leaf(Arc::new(pipeline)));
        }

        // Edge direction: child -> composed task, so toposort yields children first.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (name, tcfg) in cfg.task.iter() {
            graph.add_node(name.as_str());
            for child in tcfg.children() {
                graph.add_edge(child.as_str(), name.as_str(), ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            DevflowError::DagCycle(format!(
                "cycle detected in composed tasks involving '{}'",
                cycle.node_id()
            ))
        })?;

        for name in order {
            let Some(tcfg) = cfg.task.get(name) else {
                continue;
            };
            let children = tcfg
                .children()
                .iter()
                .map(|child| registry.require(child))
                .collect::<Result<Vec<_>>>()?;
            let task = if tcfg.sequence.is_some() {
                Task::sequence(children)
            } else {
                Task::parallel(children)
            };
            debug!(task = %name, structure = %task.id(), "built composed task");
            registry.insert(task.named(name));
        }

        Ok(registry)
    }

    /// Register `task` under its id, replacing any previous task of that id.
    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.id().to_string(), task);
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Look up `name`, failing with `TaskNotFound`.
    pub fn require(&self, name: &str) -> Result<Task> {
        self.get(name)
            .cloned()
            .ok_or_else(|| DevflowError::TaskNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RawConfigFile;
    use crate::fs::mock::MockFileSystem;

    fn config(src: &str) -> ConfigFile {
        let raw: RawConfigFile = toml::from_str(src).unwrap();
        ConfigFile::try_from(raw).unwrap()
    }

    #[test]
    fn composed_tasks_resolve_through_other_composed_tasks() {
        let cfg = config(
            r#"
[pipeline.markup]
root = "src"
src = ["*.html"]
dest = "dist"

[pipeline.styles]
root = "styles"
src = ["*.css"]
dest = "dist/css"

[task.all]
sequence = ["markup", "assets"]

[task.assets]
parallel = ["styles"]
"#,
        );
        let registry = TaskRegistry::from_config(&cfg, Arc::new(MockFileSystem::new())).unwrap();

        assert_eq!(registry.len(), 4);
        let all = registry.require("all").unwrap();
        assert_eq!(all.id().as_str(), "all");
        assert_eq!(all.leaf_names(), vec!["markup", "styles"]);
        assert!(matches!(
            registry.require("nope"),
            Err(DevflowError::TaskNotFound(name)) if name == "nope"
        ));
    }
}
