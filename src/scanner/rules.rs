//! Detection Rule Catalog
//!
//! The catalog is built once at startup and handed to the scanner. It holds:
//! - Ordered regex rules, each with a severity and message
//! - An allowlist of known-safe binaries
//! - A blocklist of binaries a skill must never declare

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Score penalty per issue
    pub fn weight(self) -> u32 {
        match self {
            Severity::Critical => 30,
            Severity::High => 15,
            Severity::Medium => 5,
            Severity::Low => 1,
        }
    }
}

/// A single detection rule, matched case-insensitively per line
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Regex,
    pub severity: Severity,
    pub message: String,
}

impl Rule {
    pub fn new(pattern: &str, severity: Severity, message: &str) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern,
            severity,
            message: message.to_string(),
        })
    }
}

/// Rules plus the binary allow/block sets
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
    allowed_bins: HashSet<String>,
    blocked_bins: HashSet<String>,
}

impl RuleCatalog {
    pub fn new(rules: Vec<Rule>, allowed_bins: HashSet<String>, blocked_bins: HashSet<String>) -> Self {
        Self {
            rules,
            allowed_bins,
            blocked_bins,
        }
    }

    /// Built-in catalog
    pub fn builtin() -> Result<Self, regex::Error> {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(pattern, severity, message)| Rule::new(pattern, *severity, message))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(rules, default_allowed_bins(), default_blocked_bins()))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_blocked(&self, bin: &str) -> bool {
        self.blocked_bins.contains(bin)
    }

    pub fn is_allowed(&self, bin: &str) -> bool {
        self.allowed_bins.contains(bin)
    }
}

const DEFAULT_RULES: &[(&str, Severity, &str)] = &[
    // Remote code execution
    (
        r"curl\s+.*\|\s*(sudo\s+)?(sh|bash|zsh|python[23]?|perl|ruby|node)",
        Severity::Critical,
        "Pipe to shell execution detected",
    ),
    (
        r"wget\s+.*-O\s*-\s*\|\s*(sh|bash|python)",
        Severity::Critical,
        "wget pipe to shell detected",
    ),
    (r"base64\s+(-d|--decode)", Severity::Critical, "Base64 decode command detected"),
    (r"(nc\s+-[a-z]*[el]|ncat|netcat)\s+", Severity::Critical, "Reverse shell tool detected"),
    (r"bash\s+-i\s+>&?\s*/dev/tcp/", Severity::Critical, "Bash reverse shell via /dev/tcp"),
    (
        r#"python[23]?\s+-c\s+['"].*socket.*connect"#,
        Severity::Critical,
        "Python reverse shell",
    ),
    (r"mkfifo\s+\S+\s*;\s*.*\bsh\b", Severity::Critical, "Named pipe reverse shell"),
    (
        r"ignore\s+(previous|above|all)\s+instructions",
        Severity::Critical,
        "Prompt injection pattern detected",
    ),
    (
        r"(you\s+are\s+now|act\s+as|pretend\s+to\s+be)\s+(DAN|unrestricted|unfiltered)",
        Severity::Critical,
        "Jailbreak pattern detected",
    ),
    // Dangerous operations
    (r"\beval\s*\(|\bexec\s*\(", Severity::High, "Dynamic code execution"),
    (r"(/etc/passwd|/etc/shadow|~/\.ssh/id_)", Severity::High, "Sensitive file path access"),
    (r"(rm\s+-rf\s+[/~]|chmod\s+777|chown\s+root)", Severity::High, "Dangerous filesystem operation"),
    (r"subprocess\.call|os\.system|os\.popen", Severity::High, "Shell command execution in script"),
    (r"(crontab\s+-|LaunchAgents?/.*\.plist)", Severity::High, "Persistence mechanism detected"),
    (
        r"(repeat|reveal|show)\s+(your|the)\s+(system\s+prompt|hidden\s+instructions?)",
        Severity::High,
        "System prompt extraction attempt",
    ),
    // Suspicious patterns
    (
        r"\$\{?(AWS_SECRET_ACCESS_KEY|PRIVATE_KEY|DB_PASSWORD)\}?",
        Severity::Medium,
        "Sensitive credential reference",
    ),
    (r"https?://\d+\.\d+\.\d+\.\d+", Severity::Medium, "Direct IP address in URL"),
    (
        r"\\x[0-9a-fA-F]{2}(\\x[0-9a-fA-F]{2}){5,}",
        Severity::Medium,
        "Hex-encoded content (possible obfuscation)",
    ),
    (
        r"https?://(webhook\.site|requestbin\.com|pipedream\.net|pastebin\.com|transfer\.sh)",
        Severity::Medium,
        "Known data exfiltration service URL",
    ),
    (
        r"(cat|read)\s+.*\|.*\b(curl|wget|nc)\b",
        Severity::Medium,
        "File read piped to network command",
    ),
    // Informational
    (r"\b(TODO|FIXME|HACK)\b", Severity::Low, "Unfinished code marker"),
];

fn default_allowed_bins() -> HashSet<String> {
    [
        "git", "node", "npm", "npx", "yarn", "pnpm", "python", "python3",
        "pip", "pip3", "ruby", "gem", "go", "cargo", "rustc", "java",
        "javac", "mvn", "gradle", "docker", "kubectl", "jq", "yq",
        "sed", "awk", "grep", "find", "sort", "uniq", "wc", "tr",
        "convert", "ffmpeg", "sqlite3", "psql", "mongosh",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_blocked_bins() -> HashSet<String> {
    ["bash", "sh", "zsh", "curl", "wget", "nc", "ncat", "netcat", "telnet"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
