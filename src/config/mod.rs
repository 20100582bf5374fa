// src/config/mod.rs

pub mod defaults;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_or_builtin};
pub use model::{
    BuildSection, ConfigFile, PipelineConfig, RawConfigFile, RuleConfig, ServerSection,
    StepConfig, TaskConfig, WatchSection,
};
