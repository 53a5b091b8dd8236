// Tracé evidence capture and sanitization core

pub mod capture;
pub mod config;
pub mod context;
pub mod evidence;
pub mod redaction;
pub mod storage;
pub mod triage;

// Re-export necessary items for the trace binary
pub use capture::{capture_log_file, run_and_capture, CaptureError, CaptureResult};
pub use config::TraceConfig;
pub use redaction::{RedactionRecord, RedactionResult, SecretRedactor};
pub use storage::StorageError;
