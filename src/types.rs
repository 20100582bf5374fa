use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What a pipeline does when a single file fails a transform step.
///
/// - `FailFast`: abort the whole pipeline and report a `PipelineError`.
/// - `LogAndContinue`: skip the offending file, keep going, and report the
///   failure as a warning on an otherwise successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    FailFast,
    LogAndContinue,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::FailFast
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => f.write_str("fail-fast"),
            FailurePolicy::LogAndContinue => f.write_str("log-and-continue"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "log-and-continue" => Ok(FailurePolicy::LogAndContinue),
            other => Err(format!(
                "invalid failure policy: {other} (expected \"fail-fast\" or \"log-and-continue\")"
            )),
        }
    }
}

/// How the pipelines of the initial build are composed.
///
/// `Sequence` runs them one after another in the configured order;
/// `Parallel` runs them concurrently. Either way the server only starts once every
/// initial pipeline has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialMode {
    Sequence,
    Parallel,
}

impl Default for InitialMode {
    fn default() -> Self {
        InitialMode::Sequence
    }
}
