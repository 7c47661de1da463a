//! Progress events for cluster reconciliation visibility.
//!
//! One apply request produces an ordered stream of these events; the stream
//! always ends with either `Finished` or `Failed`.

use serde::{Deserialize, Serialize};

/// Stage of an apply request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStage {
    Cleaning,
    EnsuringNamespace,
    Applying,
    Verifying,
}

impl std::fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cleaning => write!(f, "cleaning"),
            Self::EnsuringNamespace => write!(f, "ensuring-namespace"),
            Self::Applying => write!(f, "applying"),
            Self::Verifying => write!(f, "verifying"),
        }
    }
}

/// Progress event emitted while reconciling a chart onto the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Stage the event belongs to.
    pub stage: ApplyStage,
    /// Event payload.
    pub event: ProgressEventType,
    /// Elapsed time since the apply request started (ms).
    pub elapsed_ms: u64,
}

/// Type of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    /// Stage starting.
    Starting,
    /// One line of output from the underlying cluster tooling, relayed as it
    /// arrived.
    OutputLine { line: String },
    /// Stage completed successfully.
    Complete,
    /// Non-fatal problem; the run continues.
    Warning { message: String },
    /// Terminal: the run failed, with the last diagnostic output.
    Failed { message: String },
    /// Terminal: the release was applied.
    Finished { release: String },
}

impl ProgressEvent {
    pub fn starting(stage: ApplyStage, elapsed_ms: u64) -> Self {
        Self { stage, event: ProgressEventType::Starting, elapsed_ms }
    }

    pub fn output_line(stage: ApplyStage, line: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            stage,
            event: ProgressEventType::OutputLine { line: line.into() },
            elapsed_ms,
        }
    }

    pub fn complete(stage: ApplyStage, elapsed_ms: u64) -> Self {
        Self { stage, event: ProgressEventType::Complete, elapsed_ms }
    }

    pub fn warning(stage: ApplyStage, message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            stage,
            event: ProgressEventType::Warning { message: message.into() },
            elapsed_ms,
        }
    }

    pub fn failed(stage: ApplyStage, message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            stage,
            event: ProgressEventType::Failed { message: message.into() },
            elapsed_ms,
        }
    }

    pub fn finished(release: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            stage: ApplyStage::Verifying,
            event: ProgressEventType::Finished { release: release.into() },
            elapsed_ms,
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event,
            ProgressEventType::Failed { .. } | ProgressEventType::Finished { .. }
        )
    }

    /// Single-line rendering for logs and the CLI.
    pub fn format_human(&self) -> String {
        match &self.event {
            ProgressEventType::Starting => format!("[{}] starting", self.stage),
            ProgressEventType::OutputLine { line } => format!("[{}] {line}", self.stage),
            ProgressEventType::Complete => format!("[{}] done", self.stage),
            ProgressEventType::Warning { message } => {
                format!("[{}] warning: {message}", self.stage)
            }
            ProgressEventType::Failed { message } => {
                format!("[{}] FAILED: {message}", self.stage)
            }
            ProgressEventType::Finished { release } => {
                format!("[{}] release '{release}' applied", self.stage)
            }
        }
    }
}
