// src/pipeline/transform.rs

//! Transform steps.
//!
//! A [`Transform`] turns one [`Asset`] into another or fails with a
//! [`TransformError`]. Pipelines apply their steps strictly in order; the
//! steps themselves know nothing about orchestration.
//!
//! Built-in steps cover copying, a light stylesheet preprocessor, renames,
//! banners and source maps. [`ShellCommand`] is the plug-in point for real
//! bundlers or image optimisers: it pipes the asset through an external
//! command.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::model::StepConfig;
use crate::errors::TransformError;
use crate::pipeline::asset::Asset;

pub type TransformFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Asset, TransformError>> + Send + 'a>>;

/// A single pluggable step of a pipeline. Must be deterministic for
/// identical input content.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Step kind, used in logs and errors.
    fn name(&self) -> &str;

    fn apply(&self, asset: Asset) -> TransformFuture<'_>;
}

/// Build the transform for a configured step.
pub fn build_transform(step: &StepConfig) -> Arc<dyn Transform> {
    match step {
        StepConfig::Copy => Arc::new(CopyStep),
        StepConfig::Css => Arc::new(CssPreprocess),
        StepConfig::Banner { text } => Arc::new(Banner { text: text.clone() }),
        StepConfig::Rename { file, extension } => Arc::new(Rename {
            file: file.clone(),
            extension: extension.clone(),
        }),
        StepConfig::SourceMap => Arc::new(SourceMap),
        StepConfig::Command { cmd } => Arc::new(ShellCommand { cmd: cmd.clone() }),
    }
}

/// Identity step.
#[derive(Debug, Clone, Copy)]
pub struct CopyStep;

impl Transform for CopyStep {
    fn name(&self) -> &str {
        "copy"
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move { Ok(asset) })
    }
}

static CSS_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment regex"));
static CSS_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static CSS_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([{};,>])\s*").expect("valid punctuation regex"));

/// Stylesheet preprocessing: syntax check, then comment stripping and
/// whitespace collapsing.
#[derive(Debug, Clone, Copy)]
pub struct CssPreprocess;

impl CssPreprocess {
    pub fn minify(text: &str) -> String {
        let text = CSS_COMMENT.replace_all(text, "");
        let text = CSS_WHITESPACE.replace_all(&text, " ");
        let text = CSS_PUNCT.replace_all(&text, "$1");
        text.replace(";}", "}").trim().to_string()
    }
}

/// Check comment, string and brace balance. Errors carry a 1-based line.
pub fn check_css_syntax(text: &str) -> Result<(), String> {
    let mut line = 1usize;
    let mut open_braces: Vec<usize> = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start = line;
                let mut closed = false;
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err(format!("line {start}: unterminated comment"));
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = line;
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '\n' => break,
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return Err(format!("line {start}: unterminated string"));
                }
            }
            '{' => open_braces.push(line),
            '}' => {
                if open_braces.pop().is_none() {
                    return Err(format!("line {line}: unexpected '}}'"));
                }
            }
            _ => {}
        }
    }

    match open_braces.last() {
        Some(opened) => Err(format!("line {opened}: unclosed '{{'")),
        None => Ok(()),
    }
}

impl Transform for CssPreprocess {
    fn name(&self) -> &str {
        "css"
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move {
            let Some(text) = asset.text() else {
                return Err(TransformError::new("css", &asset.source, "not valid UTF-8"));
            };
            check_css_syntax(text)
                .map_err(|msg| TransformError::new("css", &asset.source, msg))?;
            let minified = Self::minify(text);
            Ok(asset.with_content(minified))
        })
    }
}

/// Prepend a line of text.
#[derive(Debug, Clone)]
pub struct Banner {
    pub text: String,
}

impl Transform for Banner {
    fn name(&self) -> &str {
        "banner"
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move {
            let mut content = Vec::with_capacity(self.text.len() + 1 + asset.content.len());
            content.extend_from_slice(self.text.as_bytes());
            content.push(b'\n');
            content.extend_from_slice(&asset.content);
            Ok(asset.with_content(content))
        })
    }
}

/// Rename the output file, keeping its directory.
#[derive(Debug, Clone)]
pub struct Rename {
    pub file: Option<String>,
    pub extension: Option<String>,
}

impl Transform for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move {
            let mut path: PathBuf = asset.path.clone();
            if let Some(file) = &self.file {
                path.set_file_name(file);
            }
            if let Some(ext) = &self.extension {
                path.set_extension(ext.trim_start_matches('.'));
            }
            Ok(asset.with_path(path))
        })
    }
}

/// Attach a version 3 source map naming the original source file and link
/// it from the output.
#[derive(Debug, Clone, Copy)]
pub struct SourceMap;

impl Transform for SourceMap {
    fn name(&self) -> &str {
        "source-map"
    }

    fn apply(&self, mut asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move {
            let file = asset.file_name();
            let source = asset.source.to_string_lossy().replace('\\', "/");
            let map = serde_json::json!({
                "version": 3,
                "file": file,
                "sources": [source],
                "names": [],
                "mappings": "",
            });
            let map = serde_json::to_vec(&map)
                .map_err(|e| TransformError::new("source-map", &asset.source, e.to_string()))?;

            asset
                .content
                .extend_from_slice(format!("\n/*# sourceMappingURL={file}.map */").as_bytes());
            asset.source_map = Some(map);
            Ok(asset)
        })
    }
}

/// Pipe the asset through `sh -c <cmd>`; stdout becomes the new content.
///
/// The command sees `DEVFLOW_SOURCE` (original relative path) and
/// `DEVFLOW_PATH` (current relative output path) in its environment.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub cmd: String,
}

impl Transform for ShellCommand {
    fn name(&self) -> &str {
        "command"
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move {
            let fail = |msg: String| TransformError::new("command", &asset.source, msg);

            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(&self.cmd);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&self.cmd);
                c
            };

            cmd.env("DEVFLOW_SOURCE", &asset.source)
                .env("DEVFLOW_PATH", &asset.path)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            debug!(cmd = %self.cmd, file = ?asset.source, "running command step");

            let mut child = cmd
                .spawn()
                .map_err(|e| fail(format!("spawning `{}`: {e}", self.cmd)))?;

            // Feed stdin from a separate task so a chatty command cannot
            // deadlock on a full stdout pipe.
            if let Some(mut stdin) = child.stdin.take() {
                let input = asset.content.clone();
                tokio::spawn(async move {
                    let _ = stdin.write_all(&input).await;
                });
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| fail(format!("waiting for `{}`: {e}", self.cmd)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(fail(format!(
                    "`{}` exited with {}: {}",
                    self.cmd,
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                )));
            }

            Ok(asset.with_content(output.stdout))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_minify_strips_comments_and_whitespace() {
        let css = "a {\n  color: red; /* note */\n}\n\nb , i > em { margin: 0 }\n";
        assert_eq!(CssPreprocess::minify(css), "a{color: red}b,i>em{margin: 0}");
    }

    #[test]
    fn css_syntax_reports_line_of_problem() {
        assert_eq!(check_css_syntax("a { color: red; }"), Ok(()));
        assert_eq!(
            check_css_syntax("a {\n color: red;\n}\n}"),
            Err("line 4: unexpected '}'".to_string())
        );
        assert_eq!(
            check_css_syntax("a {\n b {\n}"),
            Err("line 1: unclosed '{'".to_string())
        );
        assert_eq!(
            check_css_syntax("a { content: \"}\"; }\n/* open"),
            Err("line 2: unterminated comment".to_string())
        );
    }

    #[tokio::test]
    async fn css_step_fails_on_malformed_input() {
        let err = CssPreprocess
            .apply(Asset::new("main.css", "a { color: red;"))
            .await
            .unwrap_err();
        assert_eq!(err.step, "css");
        assert_eq!(err.path, PathBuf::from("main.css"));
        assert!(err.message.contains("unclosed"));
    }

    #[tokio::test]
    async fn rename_and_source_map_compose() {
        let asset = Asset::new("sub/main.js", "let a = 1;");
        let asset = Rename {
            file: Some("build.js".into()),
            extension: None,
        }
        .apply(asset)
        .await
        .unwrap();
        let asset = SourceMap.apply(asset).await.unwrap();

        assert_eq!(asset.path, PathBuf::from("sub/build.js"));
        assert_eq!(asset.source, PathBuf::from("sub/main.js"));
        assert!(asset.text().unwrap().ends_with("/*# sourceMappingURL=build.js.map */"));

        let map: serde_json::Value = serde_json::from_slice(asset.source_map.as_ref().unwrap()).unwrap();
        assert_eq!(map["sources"][0], "sub/main.js");
        assert_eq!(map["file"], "build.js");
    }

    #[tokio::test]
    async fn rename_extension_only() {
        let asset = Rename {
            file: None,
            extension: Some(".css".into()),
        }
        .apply(Asset::new("theme.scss", ""))
        .await
        .unwrap();
        assert_eq!(asset.path, PathBuf::from("theme.css"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_command_pipes_content() {
        let step = ShellCommand { cmd: "tr a-z A-Z".into() };
        let asset = step.apply(Asset::new("a.txt", "hello")).await.unwrap();
        assert_eq!(asset.content, b"HELLO");

        let failing = ShellCommand { cmd: "echo broken >&2; exit 3".into() };
        let err = failing.apply(Asset::new("a.txt", "x")).await.unwrap_err();
        assert!(err.message.contains("exited with 3"));
        assert!(err.message.contains("broken"));
    }
}
