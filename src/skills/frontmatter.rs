//! SKILL.md Frontmatter Validation
//!
//! A skill document starts with a YAML block fenced by `---` lines. The
//! validator checks, in order: delimiters, YAML syntax, mapping shape,
//! `name`, `name` format, `description`. Only the first failure is reported.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml_ng::{Mapping, Value};
use tracing::debug;

static FRONTMATTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---").expect("frontmatter pattern is valid")
});

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("name pattern is valid"));

/// First violated frontmatter constraint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Missing YAML frontmatter delimiters")]
    MissingDelimiters,

    #[error("Invalid YAML: {0}")]
    InvalidYaml(String),

    #[error("Frontmatter is not a YAML mapping")]
    NotMapping,

    #[error("Missing required field: name")]
    MissingName,

    #[error("Invalid name format: {0}")]
    InvalidName(String),

    #[error("Missing required field: description")]
    MissingDescription,
}

/// Validated frontmatter fields
#[derive(Debug, Clone, PartialEq)]
pub struct SkillFrontmatter {
    pub name: String,
    pub description: String,
    pub requires: Requirements,
}

/// Declared external dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    pub bins: Vec<String>,
    pub env: Vec<String>,
}

/// Outcome of [`validate`] in the `(valid, error)` shape used on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub error: String,
}

impl From<&Result<SkillFrontmatter, FrontmatterError>> for Validation {
    fn from(result: &Result<SkillFrontmatter, FrontmatterError>) -> Self {
        match result {
            Ok(_) => Self {
                valid: true,
                error: String::new(),
            },
            Err(e) => Self {
                valid: false,
                error: e.to_string(),
            },
        }
    }
}

/// Text between the opening and closing delimiters, if present
pub fn extract_block(text: &str) -> Option<&str> {
    FRONTMATTER_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Parse and check a skill document's frontmatter
pub fn parse(text: &str) -> Result<SkillFrontmatter, FrontmatterError> {
    let block = extract_block(text).ok_or(FrontmatterError::MissingDelimiters)?;

    let value: Value = serde_yaml_ng::from_str(block)
        .map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?;

    let Value::Mapping(map) = value else {
        return Err(FrontmatterError::NotMapping);
    };

    let name = match map.get("name") {
        Some(v) if is_truthy(v) => v,
        _ => return Err(FrontmatterError::MissingName),
    };
    let name = match scalar_text(name) {
        Some(s) if NAME_RE.is_match(&s) => s,
        Some(s) => return Err(FrontmatterError::InvalidName(s)),
        None => return Err(FrontmatterError::InvalidName(render(name))),
    };

    let description = match map.get("description") {
        Some(v) if is_truthy(v) => scalar_text(v).unwrap_or_else(|| render(v)),
        _ => return Err(FrontmatterError::MissingDescription),
    };

    Ok(SkillFrontmatter {
        name,
        description,
        requires: requirements(&map),
    })
}

/// Validate a skill document, returning `(valid, error)`.
pub fn validate(text: &str) -> Validation {
    Validation::from(&parse(text))
}

/// Declared `bins`, best-effort.
///
/// Any failure to locate or parse the frontmatter yields an empty list; the
/// document is not required to pass [`validate`].
pub fn declared_bins(text: &str) -> Vec<String> {
    let Some(block) = extract_block(text) else {
        return Vec::new();
    };

    match serde_yaml_ng::from_str::<Value>(block) {
        Ok(Value::Mapping(map)) => requirements(&map).bins,
        Ok(_) => Vec::new(),
        Err(e) => {
            debug!("Ignoring unparsable frontmatter in tool check: {}", e);
            Vec::new()
        }
    }
}

/// Read `metadata.openclaw.requires`, falling back to top-level `requires`
fn requirements(map: &Mapping) -> Requirements {
    let nested = map
        .get("metadata")
        .and_then(|m| m.get("openclaw"))
        .and_then(|o| o.get("requires"));

    let Some(requires) = nested.or_else(|| map.get("requires")) else {
        return Requirements::default();
    };

    Requirements {
        bins: string_list(requires.get("bins")),
        env: string_list(requires.get("env")),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(v) => scalar_text(v).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Python-style truthiness: null, empty, zero and false count as missing
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(s) => !s.is_empty(),
        Value::Mapping(m) => !m.is_empty(),
        Value::Tagged(t) => is_truthy(&t.value),
    }
}

/// Strings and numbers as text; other kinds have no name form
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn render(value: &Value) -> String {
    serde_yaml_ng::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}
