use anyhow::{Context, Result};
use std::env;
use std::io::Read;
use std::path::Path;
use trace_cli::capture::{capture_log_file, run_and_capture};
use trace_cli::config::{load_config, update_config};
use trace_cli::context::{ingest_text, save_session};
use trace_cli::evidence::gather_evidence;
use trace_cli::storage::{list_context_sessions, list_evidence_sessions, load_context};
use trace_cli::SecretRedactor;

fn usage() {
    eprintln!("Tracé - evidence capture for code review");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  trace run [--quiet] [--cwd <dir>] <command...>   Execute and record a command");
    eprintln!("  trace import --log <path>                        Import a log file as evidence");
    eprintln!("  trace list                                       List captured evidence sessions");
    eprintln!("  trace evidence [--sessions <id,id,...>]          Print gathered, redacted evidence");
    eprintln!("  trace context add [--source <name>] [--file <path>]");
    eprintln!("  trace context list");
    eprintln!("  trace context show <session-id>");
    eprintln!("  trace config set [--model <model>] [--api-key-env <var>]");
    eprintln!("  trace config show");
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();

    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        usage();
        return Ok(());
    }
    if args[0] == "--version" || args[0] == "-v" {
        eprintln!("trace {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let subcommand = args.remove(0);
    match subcommand.as_str() {
        "run" => cmd_run(args).await,
        "import" => cmd_import(args),
        "list" => cmd_list(),
        "evidence" => cmd_evidence(args),
        "context" => cmd_context(args),
        "config" => cmd_config(args),
        other => {
            eprintln!("Unknown subcommand: {}", other);
            eprintln!("Use `trace --help` for usage.");
            std::process::exit(2);
        }
    }
}

async fn cmd_run(mut args: Vec<String>) -> Result<()> {
    let mut quiet = false;
    let mut cwd: Option<String> = None;

    while !args.is_empty() && args[0].starts_with("--") {
        let flag = args.remove(0);
        match flag.as_str() {
            "--quiet" => quiet = true,
            "--cwd" => {
                if args.is_empty() {
                    eprintln!("--cwd requires a value");
                    std::process::exit(2);
                }
                cwd = Some(args.remove(0));
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(2);
            }
        }
    }

    if args.is_empty() {
        eprintln!("No command provided.");
        eprintln!("Usage: trace run [--quiet] [--cwd <dir>] <command...>");
        std::process::exit(2);
    }

    let command = args.join(" ");
    match run_and_capture(&command, None, cwd.as_deref(), quiet).await {
        // The trace process exits with the captured command's code
        Ok(result) => std::process::exit(result.exit_code),
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}

fn cmd_import(mut args: Vec<String>) -> Result<()> {
    let mut log: Option<String> = None;

    while !args.is_empty() {
        let arg = args.remove(0);
        match arg.as_str() {
            "--log" | "-l" => {
                if args.is_empty() {
                    eprintln!("--log requires a value");
                    std::process::exit(2);
                }
                log = Some(args.remove(0));
            }
            _ if !arg.starts_with('-') && log.is_none() => log = Some(arg.clone()),
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(2);
            }
        }
    }

    let Some(log) = log else {
        eprintln!("Usage: trace import --log <path>");
        std::process::exit(2);
    };

    let expanded = shellexpand::tilde(&log).into_owned();
    match capture_log_file(Path::new(&expanded), None) {
        Ok(_) => Ok(()),
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}

fn cmd_list() -> Result<()> {
    let sessions = list_evidence_sessions(None);

    if sessions.is_empty() {
        eprintln!("No evidence sessions found.");
        eprintln!("Run 'trace run <command>' to capture your first session.");
        return Ok(());
    }

    println!("{:<10} {:<6} {:<14} {:<34} COMMAND", "SESSION", "EXIT", "TYPE", "TIMESTAMP");
    for session in sessions {
        let exit = session
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<6} {:<14} {:<34} {}",
            session.session_id, exit, session.kind, session.timestamp, session.command
        );
    }

    Ok(())
}

fn cmd_evidence(mut args: Vec<String>) -> Result<()> {
    let mut session_ids: Option<Vec<String>> = None;

    while !args.is_empty() {
        let flag = args.remove(0);
        match flag.as_str() {
            "--sessions" => {
                if args.is_empty() {
                    eprintln!("--sessions requires a value");
                    std::process::exit(2);
                }
                let ids = args
                    .remove(0)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>();
                session_ids = Some(ids);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(2);
            }
        }
    }

    let config = load_config(None);
    let redactor = SecretRedactor::new();
    let text = gather_evidence(
        session_ids.as_deref(),
        config.max_evidence_lines * 100,
        config.max_evidence_lines,
        None,
        &redactor,
    );
    println!("{}", text);

    Ok(())
}

fn cmd_context(mut args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        eprintln!("Usage: trace context <add|list|show>");
        std::process::exit(2);
    }

    let action = args.remove(0);
    match action.as_str() {
        "add" => cmd_context_add(args),
        "list" => cmd_context_list(),
        "show" => cmd_context_show(args),
        other => {
            eprintln!("Unknown context action: {}", other);
            std::process::exit(2);
        }
    }
}

fn cmd_context_add(mut args: Vec<String>) -> Result<()> {
    let mut source = "plain".to_string();
    let mut file: Option<String> = None;

    while !args.is_empty() {
        let flag = args.remove(0);
        match flag.as_str() {
            "--source" | "-s" => {
                if args.is_empty() {
                    eprintln!("--source requires a value");
                    std::process::exit(2);
                }
                source = args.remove(0);
            }
            "--file" | "-f" => {
                if args.is_empty() {
                    eprintln!("--file requires a value");
                    std::process::exit(2);
                }
                file = Some(args.remove(0));
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(2);
            }
        }
    }

    let text = match file {
        Some(file) => {
            let expanded = shellexpand::tilde(&file).into_owned();
            std::fs::read_to_string(&expanded)
                .with_context(|| format!("failed to read {}", expanded))?
        }
        None => {
            eprintln!("Paste your conversation below, then press Ctrl-D.");
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read from stdin")?;
            buf
        }
    };

    if text.trim().is_empty() {
        eprintln!("No content provided.");
        std::process::exit(1);
    }

    let redactor = SecretRedactor::new();
    let session = ingest_text(&source, &text, &redactor);
    let path = save_session(&session, None).context("failed to save context")?;

    eprintln!();
    eprintln!("Context saved");
    eprintln!("  Session : {}", session.session_id);
    eprintln!("  Source  : {}", session.source);
    eprintln!("  Messages: {}", session.messages.len());
    eprintln!("  Title   : {}", session.title.as_deref().unwrap_or("(untitled)"));
    eprintln!("Saved to: {}", path.display());

    Ok(())
}

fn cmd_context_list() -> Result<()> {
    let sessions = list_context_sessions(None);

    if sessions.is_empty() {
        eprintln!("No context sessions found.");
        eprintln!("Run 'trace context add' to ingest AI session history.");
        return Ok(());
    }

    println!("{:<10} {:<10} {:<6} {:<34} TITLE", "SESSION", "SOURCE", "MSGS", "CREATED");
    for session in sessions {
        println!(
            "{:<10} {:<10} {:<6} {:<34} {}",
            session.session_id,
            session.source,
            session.message_count,
            session.created_at,
            session.title.as_deref().unwrap_or("(untitled)")
        );
    }

    Ok(())
}

fn cmd_context_show(args: Vec<String>) -> Result<()> {
    let Some(session_id) = args.first() else {
        eprintln!("Usage: trace context show <session-id>");
        std::process::exit(2);
    };

    let Some(data) = load_context(session_id, None) else {
        eprintln!("Context session not found: {}", session_id);
        std::process::exit(1);
    };

    let source = data.get("source").and_then(|v| v.as_str()).unwrap_or("unknown");
    let title = data.get("title").and_then(|v| v.as_str()).unwrap_or("(untitled)");
    println!("Session {} from {}: {}", session_id, source, title);
    println!();

    if let Some(messages) = data.get("messages").and_then(|v| v.as_array()) {
        for message in messages {
            let role = message.get("role").and_then(|v| v.as_str()).unwrap_or("?");
            let content = message.get("content").and_then(|v| v.as_str()).unwrap_or("");
            println!("[{}]", role.to_uppercase());
            println!("{}", content);
            println!();
        }
    }

    Ok(())
}

fn cmd_config(mut args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        eprintln!("Usage: trace config <set|show>");
        std::process::exit(2);
    }

    let action = args.remove(0);
    match action.as_str() {
        "set" => {
            let mut model: Option<String> = None;
            let mut api_key_env: Option<String> = None;

            while !args.is_empty() {
                let flag = args.remove(0);
                match flag.as_str() {
                    "--model" => {
                        if args.is_empty() {
                            eprintln!("--model requires a value");
                            std::process::exit(2);
                        }
                        model = Some(args.remove(0));
                    }
                    "--api-key-env" => {
                        if args.is_empty() {
                            eprintln!("--api-key-env requires a value");
                            std::process::exit(2);
                        }
                        api_key_env = Some(args.remove(0));
                    }
                    other => {
                        eprintln!("Unknown argument: {}", other);
                        std::process::exit(2);
                    }
                }
            }

            if model.is_none() && api_key_env.is_none() {
                eprintln!("Nothing to set. Usage: trace config set [--model <model>] [--api-key-env <var>]");
                std::process::exit(2);
            }

            let config = update_config(model.as_deref(), api_key_env.as_deref(), None)
                .context("failed to save config")?;
            eprintln!("Config updated: model={}, api_key_env={}", config.model, config.api_key_env);
            Ok(())
        }
        "show" => {
            let config = load_config(None);
            println!("model             : {}", config.model);
            println!(
                "api_key_env       : {}",
                if config.api_key_env.is_empty() { "(auto)" } else { &config.api_key_env }
            );
            println!("max_evidence_lines: {}", config.max_evidence_lines);
            println!("max_context_chars : {}", config.max_context_chars);
            println!("max_diff_chars    : {}", config.max_diff_chars);
            println!(
                "api key           : {}",
                if config.get_api_key().is_some() { "configured" } else { "not found" }
            );
            Ok(())
        }
        other => {
            eprintln!("Unknown config action: {}", other);
            std::process::exit(2);
        }
    }
}
