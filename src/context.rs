// Context ingestion boundary
// Conversational text enters the system here and is redacted before it is
// persisted as context

use crate::redaction::{print_redaction_warning, SecretRedactor};
use crate::storage::{self, StorageError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};

const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

/// An ingested conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSession {
    pub session_id: String,
    pub source: String,
    pub title: Option<String>,
    pub messages: Vec<ContextMessage>,
    pub created_at: String,
    pub metadata: serde_json::Value,
}

/// Ingest raw conversational text from an external AI tool.
///
/// The text is redacted before anything else happens; the session never
/// holds the raw input. The title is taken from the first non-empty line of
/// the redacted text.
pub fn ingest_text(source: &str, text: &str, redactor: &SecretRedactor) -> ContextSession {
    let result = redactor.redact(text);
    if result.count > 0 {
        print_redaction_warning(&result.records);
    }

    let title = result
        .redacted_text
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(truncate_title);

    ContextSession {
        session_id: storage::generate_session_id(),
        source: source.to_string(),
        title,
        messages: vec![ContextMessage {
            role: "user".to_string(),
            content: result.redacted_text,
        }],
        created_at: Utc::now().to_rfc3339(),
        metadata: json!({
            "redactions": result.count,
        }),
    }
}

/// Persist an ingested session through the context store.
pub fn save_session(
    session: &ContextSession,
    base_path: Option<&Path>,
) -> Result<PathBuf, StorageError> {
    let value = serde_json::to_value(session)?;
    storage::save_context(&value, base_path)
}

fn truncate_title(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        let head: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn temp_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trace_context_{}_{}", tag, Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_ingest_redacts_before_storing() {
        let redactor = SecretRedactor::new();
        let session = ingest_text(
            "plain",
            "here is my key sk-test1234567890123456789012345 please help",
            &redactor,
        );

        assert!(!session.messages[0].content.contains("sk-test"));
        assert!(session.messages[0]
            .content
            .contains("[REDACTED:OPENAI_API_KEY]"));
        assert_eq!(session.metadata["redactions"], 1);
    }

    #[test]
    fn test_ingest_takes_title_from_first_line() {
        let redactor = SecretRedactor::new();
        let session = ingest_text("plain", "\n\nFixing the login bug\ndetails follow", &redactor);
        assert_eq!(session.title.as_deref(), Some("Fixing the login bug"));
    }

    #[test]
    fn test_ingest_truncates_long_title() {
        let redactor = SecretRedactor::new();
        let long_line = "t".repeat(100);
        let session = ingest_text("plain", &long_line, &redactor);
        let title = session.title.unwrap();
        assert!(title.len() <= MAX_TITLE_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_ingest_and_save_roundtrip() {
        let base = temp_base("roundtrip");
        let redactor = SecretRedactor::new();
        let session = ingest_text("plain", "short chat", &redactor);
        save_session(&session, Some(&base)).unwrap();

        let loaded = storage::load_context(&session.session_id, Some(&base)).unwrap();
        assert_eq!(loaded["source"], "plain");
        assert_eq!(loaded["messages"][0]["content"], "short chat");

        fs::remove_dir_all(base).ok();
    }
}
