// Evidence and context gathering for LLM consumption
// Every string assembled here passes through the redactor before it is
// returned; there is no bypass path

use crate::redaction::{print_redaction_warning, SecretRedactor};
use crate::storage;
use crate::triage::{self, DEFAULT_PRESERVE_KEYWORDS};
use serde::Serialize;
use std::path::Path;

/// Transient view of one evidence session, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceBlock {
    pub source_session_id: String,
    pub command: String,
    pub exit_code: Option<i64>,
    pub compressed_text: String,
}

/// Build compressed evidence blocks for the given sessions (the five most
/// recent when none are specified).
pub fn evidence_blocks(
    session_ids: Option<&[String]>,
    max_lines: usize,
    base_path: Option<&Path>,
) -> Vec<EvidenceBlock> {
    let ids: Vec<String> = match session_ids {
        Some(ids) => ids.to_vec(),
        None => storage::list_evidence_sessions(base_path)
            .into_iter()
            .take(5)
            .map(|s| s.session_id)
            .collect(),
    };

    let mut blocks: Vec<EvidenceBlock> = Vec::new();
    for sid in &ids {
        let Some(data) = storage::load_evidence(sid, base_path) else {
            continue;
        };

        let command = data
            .get("command")
            .and_then(|v| v.as_str())
            .or_else(|| data.get("source_file").and_then(|v| v.as_str()))
            .unwrap_or("unknown")
            .to_string();

        // Imported logs carry their payload under "content"
        let stdout = data.get("stdout").and_then(|v| v.as_str()).unwrap_or("");
        let stderr = data.get("stderr").and_then(|v| v.as_str()).unwrap_or("");
        let content = data.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let combined = format!("{}{}{}", stdout, stderr, content);

        blocks.push(EvidenceBlock {
            source_session_id: sid.clone(),
            command,
            exit_code: data.get("exit_code").and_then(|v| v.as_i64()),
            compressed_text: triage::compress(&combined, max_lines, DEFAULT_PRESERVE_KEYWORDS),
        });
    }

    blocks
}

/// Gather evidence from captured sessions into one redacted string bounded
/// by `max_chars`.
pub fn gather_evidence(
    session_ids: Option<&[String]>,
    max_chars: usize,
    max_lines: usize,
    base_path: Option<&Path>,
    redactor: &SecretRedactor,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut total_chars = 0usize;

    for block in evidence_blocks(session_ids, max_lines, base_path) {
        let exit_display = block
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        let text = format!(
            "\n=== Evidence: {} ===\nExit Code: {}\n{}\n",
            block.command, exit_display, block.compressed_text
        );

        if total_chars + text.len() > max_chars {
            break;
        }
        total_chars += text.len();
        parts.push(text);
    }

    if parts.is_empty() {
        return "[No evidence captured. Run 'trace run <command>' to capture evidence.]".to_string();
    }

    let result = redactor.redact(&parts.join("\n"));
    if result.count > 0 {
        print_redaction_warning(&result.records);
    }
    result.redacted_text
}

/// Gather ingested context sessions into one redacted string bounded by
/// `max_chars`. The three most recent sessions are used when none are
/// specified; only the last ten messages of each are included.
pub fn gather_context(
    session_ids: Option<&[String]>,
    max_chars: usize,
    base_path: Option<&Path>,
    redactor: &SecretRedactor,
) -> String {
    let ids: Vec<String> = match session_ids {
        Some(ids) => ids.to_vec(),
        None => storage::list_context_sessions(base_path)
            .into_iter()
            .take(3)
            .map(|s| s.session_id)
            .collect(),
    };

    let mut parts: Vec<String> = Vec::new();
    let mut total_chars = 0usize;

    for sid in &ids {
        let Some(data) = storage::load_context(sid, base_path) else {
            continue;
        };
        let source = data
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let messages = data
            .get("messages")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let start = messages.len().saturating_sub(10);
        let mut message_texts: Vec<String> = Vec::new();
        for message in &messages[start..] {
            let role = message.get("role").and_then(|v| v.as_str()).unwrap_or("?");
            let content = message
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let content = if content.chars().count() > 500 {
                let head: String = content.chars().take(500).collect();
                format!("{}...", head)
            } else {
                content.to_string()
            };
            message_texts.push(format!("{}: {}", role.to_uppercase(), content));
        }

        let text = format!(
            "\n=== Context from {} (Session: {}) ===\n{}\n",
            source,
            sid,
            message_texts.join("\n")
        );

        if total_chars + text.len() > max_chars {
            break;
        }
        total_chars += text.len();
        parts.push(text);
    }

    if parts.is_empty() {
        return "[No context ingested. Run 'trace context add' to add AI session history.]"
            .to_string();
    }

    let result = redactor.redact(&parts.join("\n"));
    if result.count > 0 {
        print_redaction_warning(&result.records);
    }
    result.redacted_text
}
