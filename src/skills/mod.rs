//! SKILL.md Documents
//!
//! A skill document is the artifact handed to an agent:
//!
//! ```text
//! ---
//! name: email-digest
//! description: Summarize my emails
//! version: 1.0.0
//! metadata:
//!   openclaw:
//!     requires:
//!       env: [GMAIL_API_KEY]
//!       bins: [git]
//! ---
//!
//! # Email Digest
//!
//! ## Instructions
//! ...
//! ```
//!
//! This module owns frontmatter parsing/validation and the template catalog
//! offered to the generator.

pub mod frontmatter;
pub mod templates;

pub use frontmatter::{
    declared_bins, extract_block, parse, validate, FrontmatterError, Requirements,
    SkillFrontmatter, Validation,
};
pub use templates::load_templates;
