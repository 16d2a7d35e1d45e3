//! Skill Generation Pipeline
//!
//! Drives one request through:
//!
//! ```text
//! GENERATING ──► VALIDATING ──► [RETRYING ──► VALIDATING] ──► SCANNING ──► DONE
//!      │               │
//!      └──► ERROR ◄────┘
//! ```
//!
//! Each run is an independent task feeding an ordered event channel. Dropping
//! the receiving end cancels the run, including an in-flight LLM call.

pub mod events;
pub mod retry;

pub use events::{Cancelled, EventSink, Phase, PipelineEvent};
pub use retry::{validate_with_fix, FixOutcome, LlmFixer, SkillFixer};

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, LlmError, TextGenerator};
use crate::prompts;
use crate::scanner::SecurityScanner;

/// Ordered events of one run
pub type EventStream = ReceiverStream<PipelineEvent>;

/// A generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub description: String,
    pub template_id: Option<String>,
}

impl GenerateRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            template_id: None,
        }
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }
}

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Corrective calls allowed after a failed validation
    pub max_fix_attempts: u32,
    /// Bound on each LLM exchange
    pub generation_timeout: Duration,
    /// Buffered events per run
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: 1,
            generation_timeout: Duration::from_secs(120),
            channel_capacity: 64,
        }
    }
}

/// Generation orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    fixer: Arc<dyn SkillFixer>,
    scanner: SecurityScanner,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Orchestrator whose fixer uses the same generator
    pub fn new(generator: Arc<dyn TextGenerator>, scanner: SecurityScanner, config: PipelineConfig) -> Self {
        let fixer = Arc::new(LlmFixer::new(generator.clone(), config.generation_timeout));
        Self {
            generator,
            fixer,
            scanner,
            config,
        }
    }

    /// Replace the fixer
    pub fn with_fixer(mut self, fixer: Arc<dyn SkillFixer>) -> Self {
        self.fixer = fixer;
        self
    }

    pub fn scanner(&self) -> &SecurityScanner {
        &self.scanner
    }

    /// Spawn a run and return its event stream
    pub fn start(&self, request: GenerateRequest) -> EventStream {
        let (sink, rx) = EventSink::channel(self.config.channel_capacity);
        let this = self.clone();
        tokio::spawn(async move { this.run(request, sink).await });
        ReceiverStream::new(rx)
    }

    /// Drive one run to completion or cancellation
    pub async fn run(&self, request: GenerateRequest, sink: EventSink) {
        let request_id = uuid::Uuid::new_v4();
        info!(
            "Generation {} started: description_len={}, template={:?}",
            request_id,
            request.description.chars().count(),
            request.template_id
        );

        match self.drive(&request, &sink).await {
            Ok(()) => info!("Generation {} finished", request_id),
            Err(Cancelled) => warn!("Generation {} cancelled by consumer", request_id),
        }
    }

    async fn drive(&self, request: &GenerateRequest, sink: &EventSink) -> Result<(), Cancelled> {
        sink.emit(PipelineEvent::phase(Phase::Generating)).await?;

        let messages = prompts::generation_messages(&request.description, request.template_id.as_deref());
        let text = match self.stream_tokens(&messages, sink).await? {
            Ok(text) => text,
            Err(e) => {
                sink.emit(PipelineEvent::error(format!("LLM generation failed: {}", e)))
                    .await?;
                return Ok(());
            }
        };
        debug!("Generated {} chars", text.len());

        sink.emit(PipelineEvent::phase(Phase::Validating)).await?;
        let outcome =
            validate_with_fix(text, self.config.max_fix_attempts, self.fixer.as_ref(), sink).await?;

        sink.emit(PipelineEvent::validation(&outcome.result)).await?;
        match &outcome.result {
            Ok(fm) => debug!(
                "Validated skill {}: bins={:?}, env={:?}",
                fm.name, fm.requires.bins, fm.requires.env
            ),
            Err(e) => {
                sink.emit(PipelineEvent::error(format!(
                    "Generated SKILL.md is invalid after retry: {}",
                    e
                )))
                .await?;
                return Ok(());
            }
        }

        sink.emit(PipelineEvent::phase(Phase::Scanning)).await?;
        let report = self.scanner.scan(&outcome.text);
        info!(
            "Scan complete: score={}, risk={:?}, issues={}",
            report.score,
            report.risk_level,
            report.issues.len()
        );
        sink.emit(PipelineEvent::ScanResult { results: report }).await?;

        sink.emit(PipelineEvent::Done {
            skill_md: outcome.text,
        })
        .await
    }

    /// Forward tokens as they arrive and return the accumulated text.
    ///
    /// The outer `Result` is cancellation; the inner one is the LLM outcome.
    async fn stream_tokens(
        &self,
        messages: &[ChatMessage],
        sink: &EventSink,
    ) -> Result<Result<String, LlmError>, Cancelled> {
        let limit = self.config.generation_timeout;
        let deadline = Instant::now() + limit;
        let timed_out = || LlmError::Timeout(limit.as_secs());

        let opened = tokio::select! {
            biased;
            _ = sink.closed() => return Err(Cancelled),
            opened = timeout_at(deadline, self.generator.stream_chat(messages)) => opened,
        };
        let mut tokens = match opened {
            Ok(Ok(tokens)) => tokens,
            Ok(Err(e)) => return Ok(Err(e)),
            Err(_) => return Ok(Err(timed_out())),
        };

        let mut accumulated = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = sink.closed() => return Err(Cancelled),
                next = timeout_at(deadline, tokens.next()) => next,
            };
            match next {
                Ok(Some(Ok(token))) => {
                    accumulated.push_str(&token);
                    sink.emit(PipelineEvent::Token { content: token }).await?;
                }
                Ok(Some(Err(e))) => return Ok(Err(e)),
                Ok(None) => return Ok(Ok(accumulated)),
                Err(_) => return Ok(Err(timed_out())),
            }
        }
    }
}
