// Command capture with real-time streaming output
// Executes a command, mirrors both output streams to the console as they
// arrive, and persists the full record as evidence

use crate::storage::{self, StorageError};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Exit code recorded when the command's executable cannot be found.
const EXIT_NOT_FOUND: i32 = 127;
/// Exit code recorded for any other spawn/read failure.
const EXIT_RUNTIME_FAILURE: i32 = 1;

/// Capture failures that must reach the caller. Execution failures never
/// appear here - they are folded into the session's exit code and stderr.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("log file not found: {}", .0.display())]
    LogNotFound(PathBuf),
    #[error("failed to read log file {}: {source}", .path.display())]
    LogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to save evidence: {0}")]
    Storage(#[from] StorageError),
}

/// Result of a command capture session.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub session_id: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
    pub evidence_path: PathBuf,
}

/// Execute a command with real-time output streaming and capture.
///
/// The command runs through the platform shell so pipes and redirects work.
/// Both output streams are mirrored to the console line by line as they
/// arrive and buffered for storage. A missing executable records exit code
/// 127, any other runtime failure records exit code 1; neither is an error
/// to the caller. Only a storage failure is.
///
/// In quiet mode both streams are mirrored to stderr only. Use this when the
/// capture runs inside a structured transport that owns stdout.
pub async fn run_and_capture(
    command: &str,
    base_path: Option<&Path>,
    cwd: Option<&str>,
    quiet: bool,
) -> Result<CaptureResult, CaptureError> {
    let session_id = storage::generate_session_id();

    if !quiet {
        eprintln!("* Recording  {}", command);
    }

    let mut stdout_buf = String::new();
    let mut stderr_buf = String::new();
    let started = Instant::now();

    let exit_code = match spawn_shell(command, cwd) {
        Ok(child) => stream_child(child, quiet, &mut stdout_buf, &mut stderr_buf).await,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let first = command.split_whitespace().next().unwrap_or(command);
            let msg = format!("Command not found: {}\n", first);
            let _ = write!(std::io::stderr(), "{}", msg);
            stderr_buf.push_str(&msg);
            EXIT_NOT_FOUND
        }
        Err(err) => {
            let msg = format!("Error executing command: {}\n", err);
            let _ = write!(std::io::stderr(), "{}", msg);
            stderr_buf.push_str(&msg);
            EXIT_RUNTIME_FAILURE
        }
    };

    let duration_ms = started.elapsed().as_millis() as i64;

    if !quiet {
        if exit_code == 0 {
            eprintln!("+ Complete  |  {}ms  |  Session: {}", duration_ms, session_id);
        } else {
            eprintln!("x Exit {}  |  {}ms  |  Session: {}", exit_code, duration_ms, session_id);
        }
    }

    let evidence_path = storage::save_evidence(
        &session_id,
        command,
        exit_code,
        &stdout_buf,
        &stderr_buf,
        duration_ms,
        None,
        base_path,
    )?;

    if !quiet {
        eprintln!("Evidence saved: {}", evidence_path.display());
    }

    Ok(CaptureResult {
        session_id,
        command: command.to_string(),
        exit_code,
        stdout: stdout_buf,
        stderr: stderr_buf,
        duration_ms,
        evidence_path,
    })
}

fn spawn_shell(command: &str, cwd: Option<&str>) -> std::io::Result<Child> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    cmd.spawn()
}

/// Read both streams until EOF, mirroring and buffering each line in arrival
/// order. Each stream stops independently, so one closing early never blocks
/// draining of the other. Returns the exit code to record.
async fn stream_child(
    mut child: Child,
    quiet: bool,
    stdout_buf: &mut String,
    stderr_buf: &mut String,
) -> i32 {
    let mut stdout_lines = BufReader::new(child.stdout.take().unwrap()).lines();
    let mut stderr_lines = BufReader::new(child.stderr.take().unwrap()).lines();
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut runtime_failure = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ctrl_c_armed = true;

    while !(stdout_done && stderr_done) {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        mirror_line(&line, quiet, false);
                        stdout_buf.push_str(&line);
                        stdout_buf.push('\n');
                    }
                    Ok(None) => stdout_done = true,
                    Err(err) => {
                        record_read_failure(&err, stderr_buf);
                        runtime_failure = true;
                        stdout_done = true;
                    }
                }
            }
            line = stderr_lines.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        mirror_line(&line, quiet, true);
                        stderr_buf.push_str(&line);
                        stderr_buf.push('\n');
                    }
                    Ok(None) => stderr_done = true,
                    Err(err) => {
                        record_read_failure(&err, stderr_buf);
                        runtime_failure = true;
                        stderr_done = true;
                    }
                }
            }
            res = &mut ctrl_c, if ctrl_c_armed => {
                match res {
                    Ok(()) => {
                        // Deliver the kill before leaving the read loop so an
                        // interrupt cannot orphan the child.
                        let _ = child.start_kill();
                        let msg = "Interrupted: command terminated\n";
                        let _ = write!(std::io::stderr(), "{}", msg);
                        stderr_buf.push_str(msg);
                        break;
                    }
                    Err(_) => ctrl_c_armed = false,
                }
            }
        }
    }

    let exit_code = match child.wait().await {
        // code() is None when the child died from a signal
        Ok(status) => status.code().unwrap_or(EXIT_RUNTIME_FAILURE),
        Err(err) => {
            let msg = format!("Error executing command: {}\n", err);
            let _ = write!(std::io::stderr(), "{}", msg);
            stderr_buf.push_str(&msg);
            EXIT_RUNTIME_FAILURE
        }
    };

    if runtime_failure {
        EXIT_RUNTIME_FAILURE
    } else {
        exit_code
    }
}

/// Mirror one line to the live sink. In quiet mode everything goes to
/// stderr so a structured transport sharing stdout is never corrupted.
/// Sink write failures are swallowed; they must not abort the capture.
fn mirror_line(line: &str, quiet: bool, is_stderr: bool) {
    if quiet || is_stderr {
        let _ = writeln!(std::io::stderr(), "{}", line);
    } else {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

fn record_read_failure(err: &std::io::Error, stderr_buf: &mut String) {
    let msg = format!("Error reading command output: {}\n", err);
    let _ = write!(std::io::stderr(), "{}", msg);
    stderr_buf.push_str(&msg);
}

/// Import an existing log file as evidence.
///
/// Fails with `CaptureError::LogNotFound` when the path does not exist, a
/// distinct condition from a failed command capture.
pub fn capture_log_file(
    log_path: &Path,
    base_path: Option<&Path>,
) -> Result<CaptureResult, CaptureError> {
    let session_id = storage::generate_session_id();

    if !log_path.exists() {
        return Err(CaptureError::LogNotFound(log_path.to_path_buf()));
    }

    let bytes = fs::read(log_path).map_err(|source| CaptureError::LogRead {
        path: log_path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes).into_owned();

    eprintln!("Importing {} ({} bytes)", log_path.display(), content.len());

    let source_file = log_path
        .canonicalize()
        .unwrap_or_else(|_| log_path.to_path_buf());
    let evidence_path = storage::save_imported_log(
        &session_id,
        &source_file.to_string_lossy(),
        &content,
        base_path,
    )?;

    eprintln!("Imported as session: {}", session_id);
    eprintln!("Evidence saved: {}", evidence_path.display());

    Ok(CaptureResult {
        session_id,
        command: format!("import:{}", log_path.display()),
        exit_code: 0,
        stdout: content,
        stderr: String::new(),
        duration_ms: 0,
        evidence_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trace_capture_{}_{}", tag, Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_capture_echo() {
        let base = temp_base("echo");
        let result = run_and_capture("echo hello", Some(&base), None, true)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "");
        assert!(result.duration_ms >= 0);
        assert!(result.evidence_path.exists());

        fs::remove_dir_all(base).ok();
    }

    #[tokio::test]
    async fn test_capture_preserves_line_order() {
        let base = temp_base("order");
        let result = run_and_capture("printf 'one\\ntwo\\nthree\\n'", Some(&base), None, true)
            .await
            .unwrap();

        assert_eq!(result.stdout, "one\ntwo\nthree\n");

        fs::remove_dir_all(base).ok();
    }

    #[tokio::test]
    async fn test_capture_separates_streams() {
        let base = temp_base("streams");
        let result = run_and_capture("echo out; echo err 1>&2", Some(&base), None, true)
            .await
            .unwrap();

        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");

        fs::remove_dir_all(base).ok();
    }

    #[tokio::test]
    async fn test_capture_drains_after_early_stream_close() {
        let base = temp_base("early_close");
        // stdout closes immediately; stderr keeps producing afterwards
        let result = run_and_capture(
            "exec 1>&-; sleep 0.1; echo late-err 1>&2",
            Some(&base),
            None,
            true,
        )
        .await
        .unwrap();

        assert!(result.stderr.contains("late-err"));

        fs::remove_dir_all(base).ok();
    }

    #[tokio::test]
    async fn test_capture_missing_executable() {
        let base = temp_base("missing");
        let result = run_and_capture("definitely_not_a_real_command_xyz", Some(&base), None, true)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 127);
        assert!(result.stderr.to_lowercase().contains("not found"));

        fs::remove_dir_all(base).ok();
    }

    #[tokio::test]
    async fn test_capture_nonzero_exit_code() {
        let base = temp_base("exit");
        let result = run_and_capture("exit 3", Some(&base), None, true)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);

        fs::remove_dir_all(base).ok();
    }

    #[tokio::test]
    async fn test_capture_supports_shell_pipes() {
        let base = temp_base("pipes");
        let result = run_and_capture("printf 'a\\nb\\n' | wc -l", Some(&base), None, true)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "2");

        fs::remove_dir_all(base).ok();
    }

    #[tokio::test]
    async fn test_capture_respects_cwd() {
        let base = temp_base("cwd");
        let workdir = temp_base("cwd_target");
        let result = run_and_capture("pwd", Some(&base), workdir.to_str(), true)
            .await
            .unwrap();

        let reported = PathBuf::from(result.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            workdir.canonicalize().unwrap()
        );

        fs::remove_dir_all(base).ok();
        fs::remove_dir_all(workdir).ok();
    }

    #[tokio::test]
    async fn test_capture_persists_record_shape() {
        let base = temp_base("record");
        let result = run_and_capture("echo persisted", Some(&base), None, true)
            .await
            .unwrap();

        let data = storage::load_evidence(&result.session_id, Some(&base)).unwrap();
        assert_eq!(data["command"], "echo persisted");
        assert_eq!(data["exit_code"], 0);
        assert_eq!(data["stdout"], "persisted\n");
        assert!(data["timestamp"].as_str().is_some());

        fs::remove_dir_all(base).ok();
    }

    #[tokio::test]
    async fn test_storage_failure_is_distinct() {
        // Passing a file as the base path makes directory creation fail
        let blocker = std::env::temp_dir().join(format!("trace_blocker_{}", Uuid::new_v4()));
        fs::write(&blocker, "not a directory").unwrap();

        let err = run_and_capture("echo hi", Some(&blocker), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Storage(_)));

        fs::remove_file(blocker).ok();
    }

    #[test]
    fn test_import_missing_file_is_distinct() {
        let base = temp_base("import_missing");
        let missing = base.join("nope.log");

        let err = capture_log_file(&missing, Some(&base)).unwrap_err();
        assert!(matches!(err, CaptureError::LogNotFound(_)));

        fs::remove_dir_all(base).ok();
    }

    #[test]
    fn test_import_log_file() {
        let base = temp_base("import");
        let log = base.join("build.log");
        fs::write(&log, "step 1 ok\nstep 2 ok\n").unwrap();

        let result = capture_log_file(&log, Some(&base)).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.duration_ms, 0);
        assert!(result.command.starts_with("import:"));
        assert_eq!(result.stdout, "step 1 ok\nstep 2 ok\n");

        let data = storage::load_evidence(&result.session_id, Some(&base)).unwrap();
        assert_eq!(data["type"], "imported_log");
        assert_eq!(data["content"], "step 1 ok\nstep 2 ok\n");

        fs::remove_dir_all(base).ok();
    }
}
