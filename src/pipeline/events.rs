//! Pipeline Events and Framing
//!
//! Each step of a generation run is one [`PipelineEvent`]. Events are JSON
//! records with a `type` discriminator and can be framed as SSE
//! (`data: ...\n\n`) or NDJSON (`...\n`).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::scanner::ScanReport;
use crate::skills::{FrontmatterError, SkillFrontmatter};

/// Pipeline phase marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Generating,
    Validating,
    Scanning,
}

/// One step of a generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Phase {
        phase: Phase,
    },
    Token {
        content: String,
    },
    Validation {
        valid: bool,
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retrying: Option<bool>,
    },
    ScanResult {
        results: ScanReport,
    },
    Done {
        skill_md: String,
    },
    Error {
        content: String,
    },
}

impl PipelineEvent {
    pub fn phase(phase: Phase) -> Self {
        Self::Phase { phase }
    }

    /// Final validation outcome
    pub fn validation(result: &Result<SkillFrontmatter, FrontmatterError>) -> Self {
        Self::Validation {
            valid: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            retrying: None,
        }
    }

    /// Failed validation that will be followed by a fix attempt
    pub fn retrying(error: &FrontmatterError) -> Self {
        Self::Validation {
            valid: false,
            error: Some(error.to_string()),
            retrying: Some(true),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    /// `done` and `error` end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// JSON record for this event
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({"type": "error", "content": format!("Event serialization failed: {}", e)})
                .to_string()
        })
    }

    /// NDJSON frame: `<json>\n`
    pub fn to_ndjson_line(&self) -> String {
        format!("{}\n", self.to_json())
    }
}

/// Consumer went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event consumer disconnected")]
pub struct Cancelled;

/// Ordered, cancellation-aware event sender for one run
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<PipelineEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Channel-backed sink and its receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Send one event; fails once the receiver has been dropped
    pub async fn emit(&self, event: PipelineEvent) -> Result<(), Cancelled> {
        self.tx.send(event).await.map_err(|_| Cancelled)
    }

    /// Resolves when the receiver is dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
