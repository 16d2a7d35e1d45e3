//! SkillForge
//!
//! Turns a natural-language request into a validated, security-scanned
//! SKILL.md document for AI agents.
//!
//! # Features
//!
//! - **Streaming generation**: tokens forwarded as they arrive from an
//!   OpenAI-compatible endpoint
//! - **Frontmatter validation**: YAML header checks with one corrective retry
//! - **Static scanning**: rule catalog, escape normalization, tool allow/block lists
//! - **Event framing**: SSE for the HTTP API, NDJSON for the CLI
//!
//! # Architecture
//!
//! ```text
//! HTTP / CLI ──► Orchestrator ──► LLM (streamed)
//!                    │
//!                    ├── Frontmatter (parse + validate)
//!                    ├── Retry (one fix call)
//!                    ├── Scanner (rules + bins)
//!                    └── Events (SSE / NDJSON)
//! ```

pub mod config;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod scanner;
pub mod server;
pub mod skills;

pub use config::{Config, ServerConfig};
pub use llm::{ChatMessage, LlmError, OpenAiClient, TextGenerator, TokenStream};
pub use pipeline::{
    EventSink, GenerateRequest, Orchestrator, Phase, PipelineConfig, PipelineEvent, SkillFixer,
};
pub use scanner::{Issue, RiskLevel, RuleCatalog, ScanReport, SecurityScanner, Severity};
pub use server::{ApiServer, AppState};
pub use skills::{FrontmatterError, SkillFrontmatter, Validation};
