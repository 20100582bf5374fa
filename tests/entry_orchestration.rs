// tests/entry_orchestration.rs

mod common;
use crate::common::{snapshot, write_file};

use std::path::Path;
use std::sync::Arc;

use devflow::config::{ConfigFile, StepConfig};
use devflow::engine::RuntimeEvent;
use devflow::errors::DevflowError;
use devflow::fs::RealFileSystem;
use devflow::orchestrate::Project;
use devflow::server::ReloadCoordinator;
use devflow::types::{FailurePolicy, InitialMode};
use devflow_test_utils::builders::{ConfigFileBuilder, PipelineConfigBuilder};
use devflow_test_utils::{init_tracing, with_timeout};

/// markup, styles, scripts and images under `root/src`, built into `root/dist`.
fn site_config(root: &Path, styles_policy: FailurePolicy) -> ConfigFileBuilder {
    ConfigFileBuilder::new()
        .with_pipeline(
            "markup",
            PipelineConfigBuilder::new(root.join("src"), "*.html", root.join("dist"))
                .watch("src/*.html")
                .build(),
        )
        .with_pipeline(
            "styles",
            PipelineConfigBuilder::new(root.join("src/css"), "**/*.css", root.join("dist/css"))
                .policy(styles_policy)
                .watch("src/css/**/*.css")
                .step(StepConfig::Css)
                .step(StepConfig::SourceMap)
                .build(),
        )
        .with_pipeline(
            "scripts",
            PipelineConfigBuilder::new(root.join("src/js"), "**/*.js", root.join("dist/js"))
                .watch("src/js/**/*.js")
                .step(StepConfig::Banner {
                    text: "/* site */".to_string(),
                })
                .build(),
        )
        .with_pipeline(
            "images",
            PipelineConfigBuilder::new(root.join("src/img"), "**/*", root.join("dist/img"))
                .watch("src/img/**")
                .build(),
        )
        .with_initial(&["markup", "styles", "scripts", "images"])
        .watch_root(root)
        .serve_ephemeral(root.join("dist"))
}

fn project(cfg: ConfigFile) -> Project {
    Project::from_config(cfg, Arc::new(RealFileSystem)).unwrap()
}

#[tokio::test]
async fn empty_pipelines_build_then_server_starts_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for sub in ["src/css", "src/js", "src/img"] {
        std::fs::create_dir_all(root.join(sub)).unwrap();
    }

    let project = project(site_config(root, FailurePolicy::LogAndContinue).build());

    let reports = with_timeout(project.initial_build()).await.unwrap();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.files == 0 && r.is_clean()));

    let coordinator = Arc::new(ReloadCoordinator::new(project.config.server.clone()));
    let session = with_timeout(project.start_dev(Arc::clone(&coordinator)))
        .await
        .unwrap();

    let started = coordinator.session().unwrap();
    assert_ne!(started.http_addr.port(), 0);
    assert!(!coordinator.start_server(&project.config.server.base).unwrap());
    assert_eq!(coordinator.session().unwrap(), started);

    let tx = session.sender();
    tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    with_timeout(session.run()).await.unwrap();
}

#[tokio::test]
async fn fail_fast_pipeline_failure_aborts_initial_build() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/index.html", "<html><body>home</body></html>");
    write_file(root, "src/css/main.css", "a { color: red;");

    let project = project(site_config(root, FailurePolicy::FailFast).build());
    let coordinator = Arc::new(ReloadCoordinator::new(project.config.server.clone()));

    let err = with_timeout(project.start_dev(Arc::clone(&coordinator)))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DevflowError::InitialBuild(_)));
    assert!(!coordinator.is_started());
    // Sequence order: markup ran before the styles failure.
    assert!(root.join("dist/index.html").is_file());
    assert!(!root.join("dist/js").exists());
}

#[tokio::test]
async fn log_and_continue_failure_keeps_building() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/css/broken.css", "a { color: red;");
    write_file(root, "src/css/theme/ok.css", "a {\n  color: blue;\n}\n");
    write_file(root, "src/js/app.js", "run();\n");

    let project = project(site_config(root, FailurePolicy::LogAndContinue).build());
    let reports = with_timeout(project.initial_build()).await.unwrap();

    let styles = reports.iter().find(|r| r.pipeline == "styles").unwrap();
    assert_eq!(styles.files, 1);
    assert_eq!(styles.warnings.len(), 1);
    assert!(root.join("dist/css/theme/ok.css").is_file());
    assert!(root.join("dist/css/theme/ok.css.map").is_file());
    assert!(!root.join("dist/css/broken.css").exists());

    let script = std::fs::read_to_string(root.join("dist/js/app.js")).unwrap();
    assert!(script.starts_with("/* site */"));
}

#[tokio::test]
async fn lenient_pipeline_failure_does_not_skip_later_pipelines() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/index.html", "<html><body>home</body></html>");
    write_file(root, "src/css/main.css", "a { color: red; }");
    write_file(root, "src/js/app.js", "run();\n");
    // The styles destination cannot be created.
    write_file(root, "dist/css", "not a directory");

    let project = project(site_config(root, FailurePolicy::LogAndContinue).build());
    let coordinator = Arc::new(ReloadCoordinator::new(project.config.server.clone()));
    let session = with_timeout(project.start_dev(Arc::clone(&coordinator)))
        .await
        .unwrap();

    assert!(coordinator.is_started());
    assert!(root.join("dist/index.html").is_file());
    assert!(root.join("dist/js/app.js").is_file());

    let tx = session.sender();
    tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    with_timeout(session.run()).await.unwrap();
}

#[tokio::test]
async fn lenient_failure_keeps_reports_of_other_pipelines() {
    init_tracing();
    for mode in [InitialMode::Sequence, InitialMode::Parallel] {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(root, "src/index.html", "<p>home</p>");
        write_file(root, "src/css/main.css", "a { color: red; }");
        write_file(root, "src/js/app.js", "run();\n");
        write_file(root, "dist/css", "not a directory");

        let cfg = site_config(root, FailurePolicy::LogAndContinue)
            .initial_mode(mode)
            .build();
        let reports = with_timeout(project(cfg).initial_build()).await.unwrap();

        let mut names: Vec<&str> = reports.iter().map(|r| r.pipeline.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["images", "markup", "scripts"], "mode {mode:?}");
    }
}

#[tokio::test]
async fn rebuilding_unchanged_sources_is_byte_identical() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/index.html", "<html><body>home</body></html>");
    write_file(root, "src/css/main.css", "body {\n  margin: 0;\n}\n");
    write_file(root, "src/js/app.js", "run();\n");
    write_file(root, "src/img/logo.svg", "<svg/>");

    let project = project(
        site_config(root, FailurePolicy::FailFast)
            .initial_mode(InitialMode::Parallel)
            .build(),
    );

    let first = with_timeout(project.initial_build()).await.unwrap();
    let before = snapshot(&root.join("dist"));
    let second = with_timeout(project.initial_build()).await.unwrap();
    let after = snapshot(&root.join("dist"));

    assert_eq!(before, after);
    assert_eq!(first.iter().map(|r| r.written).sum::<usize>(), 4);
    assert_eq!(second.iter().map(|r| r.written).sum::<usize>(), 0);
    assert_eq!(second.iter().map(|r| r.files).sum::<usize>(), 4);
}

#[tokio::test]
async fn run_once_targets_one_task() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "src/index.html", "<p>x</p>");
    write_file(root, "src/js/app.js", "run();\n");

    let project = project(
        site_config(root, FailurePolicy::FailFast)
            .with_parallel("assets", &["styles", "scripts", "images"])
            .build(),
    );

    let reports = with_timeout(project.run_once("assets")).await.unwrap();
    let names: Vec<&str> = reports.iter().map(|r| r.pipeline.as_str()).collect();
    assert_eq!(names, vec!["styles", "scripts", "images"]);
    assert!(root.join("dist/js/app.js").is_file());
    assert!(!root.join("dist/index.html").exists());

    assert!(matches!(
        project.run_once("ghost").await,
        Err(DevflowError::TaskNotFound(name)) if name == "ghost"
    ));
}

#[test]
fn config_paths_resolve_against_the_config_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(
        root,
        "Devflow.toml",
        r#"
[server]
base = "public"

[pipeline.markup]
root = "pages"
src = ["**/*.html"]
dest = "public"
watch = ["pages/**/*.html"]
"#,
    );

    let project = Project::load(&root.join("Devflow.toml")).unwrap();
    assert_eq!(project.config.server.base, root.join("public"));
    assert_eq!(project.config.pipeline["markup"].root, root.join("pages"));
    assert_eq!(project.config.watch.root, root.join("."));

    let listing = project.describe();
    assert!(listing.contains("markup"));
    assert!(listing.contains("pages/**/*.html -> markup"));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Project::load(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, DevflowError::ConfigError(_)));
}
