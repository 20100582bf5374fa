// src/config/defaults.rs

//! Built-in project layout used when no config file exists.
//!
//! ```text
//! src/*.html        -> dist/           (markup)
//! src/css/*.css     -> dist/css/       (styles, log-and-continue)
//! src/js/main.js    -> dist/js/build.js (scripts)
//! src/img/*         -> dist/img/       (images)
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::model::{
    BuildSection, PipelineConfig, RawConfigFile, ServerSection, StepConfig, WatchSection,
};
use crate::types::{FailurePolicy, InitialMode};

/// The built-in four-pipeline layout.
pub fn builtin_layout() -> RawConfigFile {
    let mut pipeline = BTreeMap::new();

    pipeline.insert(
        "markup".to_string(),
        PipelineConfig {
            root: PathBuf::from("src"),
            src: vec!["*.html".to_string()],
            dest: PathBuf::from("dist"),
            policy: FailurePolicy::FailFast,
            watch: vec!["src/*.html".to_string()],
            steps: vec![StepConfig::Copy],
        },
    );

    pipeline.insert(
        "styles".to_string(),
        PipelineConfig {
            root: PathBuf::from("src/css"),
            src: vec!["*.css".to_string()],
            dest: PathBuf::from("dist/css"),
            policy: FailurePolicy::LogAndContinue,
            watch: vec!["src/css/**/*.css".to_string()],
            steps: vec![StepConfig::Css, StepConfig::SourceMap],
        },
    );

    pipeline.insert(
        "scripts".to_string(),
        PipelineConfig {
            root: PathBuf::from("src/js"),
            src: vec!["main.js".to_string()],
            dest: PathBuf::from("dist/js"),
            policy: FailurePolicy::FailFast,
            watch: vec!["src/js/**/*.js".to_string()],
            steps: vec![
                StepConfig::Rename {
                    file: Some("build.js".to_string()),
                    extension: None,
                },
                StepConfig::SourceMap,
            ],
        },
    );

    pipeline.insert(
        "images".to_string(),
        PipelineConfig {
            root: PathBuf::from("src/img"),
            src: vec!["*".to_string()],
            dest: PathBuf::from("dist/img"),
            policy: FailurePolicy::FailFast,
            watch: vec!["src/img/*".to_string()],
            steps: vec![StepConfig::Copy],
        },
    );

    RawConfigFile {
        server: ServerSection::default(),
        build: BuildSection {
            initial: Some(
                ["markup", "styles", "scripts", "images"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            initial_mode: InitialMode::Sequence,
        },
        watch: WatchSection::default(),
        pipeline,
        task: BTreeMap::new(),
        rule: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ConfigFile;

    #[test]
    fn builtin_layout_is_valid() {
        let cfg = ConfigFile::try_from(builtin_layout()).expect("builtin layout validates");
        assert_eq!(
            cfg.initial_tasks(),
            vec!["markup", "styles", "scripts", "images"]
        );
        assert_eq!(
            cfg.pipeline["styles"].policy,
            FailurePolicy::LogAndContinue
        );
    }
}
