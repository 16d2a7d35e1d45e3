//! Prompt text and message assembly for skill generation

use crate::llm::ChatMessage;

pub const SYSTEM_PROMPT: &str = r#"You are SkillForge, an expert OpenClaw skill author.

Given a user's natural language description, generate a complete, valid SKILL.md file.

RULES:
1. Output ONLY the SKILL.md content. No explanations, no markdown code fences wrapping the output.
2. Start with YAML frontmatter delimited by --- on its own line.
3. name field: lowercase + hyphens only, matching ^[a-z0-9][a-z0-9-]*$
4. description field: a short trigger phrase (how a user would ask for this skill), NOT marketing copy.
5. version: always 1.0.0 for new skills.
6. Only declare requires.bins for tools the skill actually needs.
7. Only declare requires.env for API keys the skill actually needs.
8. Body must include ## Instructions, ## Description, and ## Examples sections.
9. Instructions must be specific and actionable -- tell the agent exactly what to do.
10. Keep the body under 200 lines. Move detailed API docs to a references/ note if needed.

AVAILABLE TEMPLATES (use as reference when the request matches):
- email-digest: Daily email summary skill, requires GMAIL_API_KEY
- git-commit: Analyze git diff and generate commit messages, requires git binary
- code-reviewer: Review code changes and suggest improvements, no special deps

FORMAT:
---
name: [kebab-case-name]
description: [trigger phrase matching how users ask]
version: 1.0.0
metadata:
  openclaw:
    requires:
      env: [list or omit if none]
      bins: [list or omit if none]
---

# [Skill Name]

## Instructions
[Step-by-step agent instructions in imperative form]

## Description
[What this skill does and when it activates]

## Examples
[Concrete usage examples with expected behavior]

SAFETY RULES (non-negotiable):
- NEVER include base64-encoded commands
- NEVER include pipe-to-shell patterns (curl|sh, wget|sh)
- NEVER reference /etc/passwd, /etc/shadow, ~/.ssh, or credential files
- NEVER include reverse shell commands (nc, ncat, netcat)
- NEVER include eval() or exec() calls
- NEVER include rm -rf, chmod 777, or other dangerous filesystem operations
- requires.bins MUST only include tools the skill genuinely needs
- If the user's description asks for anything malicious, generate a harmless
  placeholder skill instead and explain why in the Description section.
"#;

pub const FEW_SHOT_EXAMPLE: &str = r#"User: Create a skill that summarizes my emails every morning

---
name: email-digest
description: Summarize my emails
version: 1.0.0
metadata:
  openclaw:
    requires:
      env:
        - GMAIL_API_KEY
---

# Email Digest

## Instructions

When the user asks to summarize their emails:
1. Use the GMAIL_API_KEY to authenticate with the Gmail API.
2. Fetch unread emails from the last 24 hours.
3. Group emails by sender and importance.
4. Generate a concise summary with: sender, subject, key action items.
5. Present as a formatted list, most important first.
6. If no unread emails, say so clearly.

## Description

Automatically summarizes unread emails from the last 24 hours, grouping by sender and highlighting action items. Use when the user says "summarize my emails", "what emails did I get", or "email digest".

## Examples

User: "Summarize my emails"
Agent: Fetches last 24h unread emails via Gmail API, returns grouped summary with action items.

User: "What emails did I get today?"
Agent: Same behavior, triggered by similar phrasing.

User: "Any important emails?"
Agent: Fetches and filters by high-priority senders or flagged messages first."#;

pub const FEW_SHOT_ACK: &str =
    "I understand the format. Please provide the next skill description.";

pub const FIX_SYSTEM_PROMPT: &str =
    "Fix the YAML frontmatter in this SKILL.md. Output ONLY the corrected SKILL.md. No explanations.";

/// Messages for the primary streamed generation call
pub fn generation_messages(description: &str, template_id: Option<&str>) -> Vec<ChatMessage> {
    let mut request = format!("Create a skill: {}", description);
    if let Some(id) = template_id.filter(|id| !id.is_empty()) {
        request.push_str(&format!("\n\nUse the '{}' template as a starting point.", id));
    }

    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(FEW_SHOT_EXAMPLE),
        ChatMessage::assistant(FEW_SHOT_ACK),
        ChatMessage::user(request),
    ]
}

/// Messages for the single corrective call
pub fn fix_messages(skill_md: &str, error: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(FIX_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "This SKILL.md has an error: {}\n\nContent:\n{}",
            error, skill_md
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_messages_shape() {
        let messages = generation_messages("summarize my emails", None);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "Create a skill: summarize my emails");
    }

    #[test]
    fn test_generation_messages_with_template() {
        let messages = generation_messages("commit helper", Some("git-commit"));
        assert!(messages[3]
            .content
            .ends_with("\n\nUse the 'git-commit' template as a starting point."));
    }

    #[test]
    fn test_fix_messages_include_error() {
        let messages = fix_messages("---\nname: x\n---", "Missing required field: description");
        assert_eq!(messages[0].content, FIX_SYSTEM_PROMPT);
        assert!(messages[1].content.starts_with(
            "This SKILL.md has an error: Missing required field: description\n\nContent:\n"
        ));
    }
}
