// Evidence and context storage under the .ai/ directory

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const AI_DIR_NAME: &str = ".ai";
pub const EVIDENCE_DIR: &str = "evidence";
pub const CONTEXT_DIR: &str = "context";

/// Failures while persisting or preparing records. Kept separate from
/// capture outcomes: a command may have succeeded while storage failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to prepare storage directory: {0}")]
    Prepare(#[source] std::io::Error),
    #[error("failed to write record: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A persisted capture record, one JSON document per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub session_id: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timestamp: String,
    pub duration_ms: i64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Summary row for session listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub command: String,
    pub exit_code: Option<i64>,
    pub timestamp: String,
    pub kind: String,
    pub file: PathBuf,
}

/// Summary row for context session listings.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub session_id: String,
    pub source: String,
    pub title: Option<String>,
    pub message_count: usize,
    pub created_at: String,
    pub file: PathBuf,
}

/// The .ai/ directory for a base path (current directory by default).
pub fn get_ai_directory(base_path: Option<&Path>) -> PathBuf {
    let base = match base_path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    base.join(AI_DIR_NAME)
}

/// Create the .ai/ directory structure (evidence/ and context/) if missing.
pub fn initialize_storage(base_path: Option<&Path>) -> Result<PathBuf, StorageError> {
    let ai_dir = get_ai_directory(base_path);
    fs::create_dir_all(ai_dir.join(EVIDENCE_DIR)).map_err(StorageError::Prepare)?;
    fs::create_dir_all(ai_dir.join(CONTEXT_DIR)).map_err(StorageError::Prepare)?;
    Ok(ai_dir)
}

/// Generate a session identifier: a short UUID prefix, kept readable at the
/// cost of a small id space.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Current timestamp in ISO 8601 UTC.
pub fn get_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Save an evidence session as `evidence/session_<id>.json`.
#[allow(clippy::too_many_arguments)]
pub fn save_evidence(
    session_id: &str,
    command: &str,
    exit_code: i32,
    stdout: &str,
    stderr: &str,
    duration_ms: i64,
    metadata: Option<Map<String, Value>>,
    base_path: Option<&Path>,
) -> Result<PathBuf, StorageError> {
    let ai_dir = initialize_storage(base_path)?;

    let record = EvidenceRecord {
        session_id: session_id.to_string(),
        command: command.to_string(),
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        timestamp: get_timestamp(),
        duration_ms,
        metadata: metadata.unwrap_or_default(),
    };

    let file_path = ai_dir
        .join(EVIDENCE_DIR)
        .join(format!("session_{}.json", session_id));
    let body = serde_json::to_string_pretty(&record)?;
    fs::write(&file_path, body).map_err(StorageError::Write)?;

    Ok(file_path)
}

/// Save an imported log file as `evidence/log_<id>.json`.
pub fn save_imported_log(
    session_id: &str,
    source_file: &str,
    content: &str,
    base_path: Option<&Path>,
) -> Result<PathBuf, StorageError> {
    let ai_dir = initialize_storage(base_path)?;

    let record = json!({
        "session_id": session_id,
        "type": "imported_log",
        "source_file": source_file,
        "content": content,
        "timestamp": get_timestamp(),
        "metadata": {
            "imported": true,
        },
    });

    let file_path = ai_dir
        .join(EVIDENCE_DIR)
        .join(format!("log_{}.json", session_id));
    let body = serde_json::to_string_pretty(&record)?;
    fs::write(&file_path, body).map_err(StorageError::Write)?;

    Ok(file_path)
}

/// List all evidence sessions, newest first. Unreadable or malformed files
/// are skipped rather than failing the listing.
pub fn list_evidence_sessions(base_path: Option<&Path>) -> Vec<SessionSummary> {
    let evidence_dir = get_ai_directory(base_path).join(EVIDENCE_DIR);
    let entries = match fs::read_dir(&evidence_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut sessions: Vec<SessionSummary> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(body) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(data) = serde_json::from_str::<Value>(&body) else {
            continue;
        };

        let command = data
            .get("command")
            .and_then(|v| v.as_str())
            .or_else(|| data.get("source_file").and_then(|v| v.as_str()))
            .unwrap_or("N/A")
            .to_string();

        sessions.push(SessionSummary {
            session_id: data
                .get("session_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            command,
            exit_code: data.get("exit_code").and_then(|v| v.as_i64()),
            timestamp: data
                .get("timestamp")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            kind: data
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("command")
                .to_string(),
            file: path,
        });
    }

    sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sessions
}

/// Load a specific evidence session, trying both naming patterns.
pub fn load_evidence(session_id: &str, base_path: Option<&Path>) -> Option<Value> {
    let evidence_dir = get_ai_directory(base_path).join(EVIDENCE_DIR);

    for prefix in ["session", "log"] {
        let file_path = evidence_dir.join(format!("{}_{}.json", prefix, session_id));
        if let Ok(body) = fs::read_to_string(&file_path) {
            if let Ok(data) = serde_json::from_str(&body) {
                return Some(data);
            }
        }
    }

    None
}

/// Save a context session as `context/context_<id>.json`.
pub fn save_context(context_data: &Value, base_path: Option<&Path>) -> Result<PathBuf, StorageError> {
    let ai_dir = initialize_storage(base_path)?;

    let session_id = context_data
        .get("session_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_session_id);

    let file_path = ai_dir
        .join(CONTEXT_DIR)
        .join(format!("context_{}.json", session_id));
    let body = serde_json::to_string_pretty(context_data)?;
    fs::write(&file_path, body).map_err(StorageError::Write)?;

    Ok(file_path)
}

/// List all context sessions, newest first.
pub fn list_context_sessions(base_path: Option<&Path>) -> Vec<ContextSummary> {
    let context_dir = get_ai_directory(base_path).join(CONTEXT_DIR);
    let entries = match fs::read_dir(&context_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut sessions: Vec<ContextSummary> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with("context_") || !name.ends_with(".json") {
            continue;
        }
        let Ok(body) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(data) = serde_json::from_str::<Value>(&body) else {
            continue;
        };

        let message_count = data
            .get("messages")
            .and_then(|v| v.as_array())
            .map(|m| m.len())
            .unwrap_or(0);

        sessions.push(ContextSummary {
            session_id: data
                .get("session_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            source: data
                .get("source")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            title: data
                .get("title")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            message_count,
            created_at: data
                .get("created_at")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            file: path,
        });
    }

    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sessions
}

/// Load a specific context session.
pub fn load_context(session_id: &str, base_path: Option<&Path>) -> Option<Value> {
    let file_path = get_ai_directory(base_path)
        .join(CONTEXT_DIR)
        .join(format!("context_{}.json", session_id));

    let body = fs::read_to_string(file_path).ok()?;
    serde_json::from_str(&body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trace_storage_{}_{}", tag, Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_session_id_length() {
        let id = generate_session_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_save_and_load_evidence() {
        let base = temp_base("roundtrip");
        let path = save_evidence("abc12345", "echo hi", 0, "hi\n", "", 12, None, Some(&base)).unwrap();
        assert!(path.exists());

        let data = load_evidence("abc12345", Some(&base)).unwrap();
        assert_eq!(data["command"], "echo hi");
        assert_eq!(data["exit_code"], 0);
        assert_eq!(data["stdout"], "hi\n");
        assert_eq!(data["duration_ms"], 12);
        assert!(data["timestamp"].as_str().unwrap().contains('T'));
        assert!(data["metadata"].is_object());

        fs::remove_dir_all(base).ok();
    }

    #[test]
    fn test_imported_log_record_shape() {
        let base = temp_base("import");
        save_imported_log("def67890", "/var/log/build.log", "build ok\n", Some(&base)).unwrap();

        let data = load_evidence("def67890", Some(&base)).unwrap();
        assert_eq!(data["type"], "imported_log");
        assert_eq!(data["source_file"], "/var/log/build.log");
        assert_eq!(data["content"], "build ok\n");
        assert_eq!(data["metadata"]["imported"], true);

        fs::remove_dir_all(base).ok();
    }

    #[test]
    fn test_list_skips_malformed_files() {
        let base = temp_base("malformed");
        save_evidence("aaa11111", "true", 0, "", "", 1, None, Some(&base)).unwrap();
        let evidence_dir = get_ai_directory(Some(&base)).join(EVIDENCE_DIR);
        fs::write(evidence_dir.join("session_broken.json"), "{not json").unwrap();

        let sessions = list_evidence_sessions(Some(&base));
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "aaa11111");

        fs::remove_dir_all(base).ok();
    }

    #[test]
    fn test_list_includes_imported_logs() {
        let base = temp_base("mixed");
        save_evidence("run00001", "ls", 0, "", "", 1, None, Some(&base)).unwrap();
        save_imported_log("log00001", "/tmp/ci.log", "done", Some(&base)).unwrap();

        let sessions = list_evidence_sessions(Some(&base));
        assert_eq!(sessions.len(), 2);
        let kinds: Vec<&str> = sessions.iter().map(|s| s.kind.as_str()).collect();
        assert!(kinds.contains(&"command"));
        assert!(kinds.contains(&"imported_log"));

        fs::remove_dir_all(base).ok();
    }

    #[test]
    fn test_load_missing_session_is_none() {
        let base = temp_base("missing");
        assert!(load_evidence("nope0000", Some(&base)).is_none());
        fs::remove_dir_all(base).ok();
    }

    #[test]
    fn test_context_roundtrip_and_listing() {
        let base = temp_base("context");
        let session = json!({
            "session_id": "ctx00001",
            "source": "plain",
            "title": "debugging session",
            "messages": [{"role": "user", "content": "hello"}],
            "created_at": get_timestamp(),
        });
        save_context(&session, Some(&base)).unwrap();

        let loaded = load_context("ctx00001", Some(&base)).unwrap();
        assert_eq!(loaded["source"], "plain");

        let listed = list_context_sessions(Some(&base));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_count, 1);
        assert_eq!(listed[0].title.as_deref(), Some("debugging session"));

        fs::remove_dir_all(base).ok();
    }

    #[test]
    fn test_listing_on_uninitialized_directory_is_empty() {
        let base = temp_base("empty");
        assert!(list_evidence_sessions(Some(&base)).is_empty());
        assert!(list_context_sessions(Some(&base)).is_empty());
        fs::remove_dir_all(base).ok();
    }
}
