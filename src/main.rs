//! # docchat CLI
//!
//! Processes uploaded documents and answers questions about them.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat chat <FILES>...` | Process files, then chat interactively |
//! | `docchat ask <FILES>... --question <Q>` | Process files and answer one question |
//! | `docchat extract <FILES>...` | Show extracted segments and chunk counts |
//!
//! Inside `chat`, lines starting with `/` are commands: `/process <FILES>...`
//! rebuilds the index from new files (quote paths containing spaces),
//! `/history` reprints the transcript with timestamps, `/key` re-enters the
//! API key and `/quit` exits. Anything else is a question.
//!
//! Logs go to stderr; set `RUST_LOG=docchat=debug` for stage details.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use docchat::chunk::RecursiveSplitter;
use docchat::config::{self, Config};
use docchat::extract::{load_file, LoadOptions};
use docchat::models::{ChatMessage, Role, UploadedFile};
use docchat::session::{ChatSession, ProcessReport, SessionError};
use docchat::tokens::create_counter;

const DEFAULT_CONFIG: &str = "./docchat.toml";

/// docchat: chat with your PDF and DOCX files.
///
/// Documents are split into token-bounded chunks, embedded locally and
/// searched with maximal marginal relevance; answers come from a hosted LLM.
#[derive(Parser)]
#[command(name = "docchat", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./docchat.toml`; built-in defaults apply when that file
    /// does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process files, then start an interactive chat.
    Chat {
        /// PDF, DOCX or PPTX files.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// LLM API key. Falls back to the variable named by `llm.api_key_env`,
        /// then to an interactive prompt.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Process files and answer a single question.
    Ask {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// The question to ask.
        #[arg(long, short)]
        question: String,

        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print extracted segments and chunk counts. No network access.
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docchat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };

    match cli.command {
        Commands::Chat { files, api_key } => {
            let uploads = read_uploads(&files)?;
            let mut session = ChatSession::new(cfg);
            let key = match resolve_api_key(api_key, session.config()) {
                Some(key) => key,
                None => prompt_api_key()?,
            };
            session.set_api_key(key);
            info!(session = %session.session_id(), "chat session started");

            print_message(&session.transcript()[0]);
            process_and_report(&mut session, &uploads).await;
            repl(&mut session).await?;
        }
        Commands::Ask {
            files,
            question,
            api_key,
        } => {
            let uploads = read_uploads(&files)?;
            let mut session = ChatSession::new(cfg);
            let key = resolve_api_key(api_key, session.config()).with_context(|| {
                format!(
                    "No API key: pass --api-key or set {}",
                    session.config().llm.api_key_env
                )
            })?;
            session.set_api_key(key);

            let report = session.process(&uploads).await.map_err(describe)?;
            print_report(&report);
            let answer = session.submit(&question).await.map_err(describe)?;
            print_message(answer);
        }
        Commands::Extract { files } => {
            extract(&cfg, &files)?;
        }
    }

    Ok(())
}

async fn repl(session: &mut ChatSession) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.split_once(' ').unwrap_or((input, "")) {
            ("/quit" | "/exit", _) => break,
            ("/history", _) => {
                for message in session.transcript() {
                    print!("[{}] ", message.created_at.with_timezone(&Local).format("%H:%M:%S"));
                    print_message(message);
                }
            }
            ("/key", _) => match prompt_api_key() {
                Ok(key) => session.set_api_key(key),
                Err(e) => eprintln!("Error: {:#}", e),
            },
            ("/process", rest) => {
                let paths = split_paths(rest);
                if paths.is_empty() {
                    eprintln!("Usage: /process <FILES>...");
                    continue;
                }
                if !session.has_api_key() {
                    match prompt_api_key() {
                        Ok(key) => session.set_api_key(key),
                        Err(e) => {
                            eprintln!("Error: {:#}", e);
                            continue;
                        }
                    }
                }
                match read_uploads(&paths) {
                    Ok(uploads) => process_and_report(session, &uploads).await,
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            (cmd, _) if cmd.starts_with('/') => {
                eprintln!("Unknown command {}. Try /process, /history, /key or /quit.", cmd);
            }
            _ => match session.submit(input).await {
                Ok(answer) => print_message(answer),
                Err(e) => eprintln!("Error: {}", describe(e)),
            },
        }
    }

    Ok(())
}

async fn process_and_report(session: &mut ChatSession, uploads: &[UploadedFile]) {
    match session.process(uploads).await {
        Ok(report) => print_report(&report),
        Err(e) => eprintln!("Error: {}", describe(e)),
    }
}

/// Split `/process` arguments on whitespace. Single or double quotes group a
/// path that contains spaces.
fn split_paths(args: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut in_path = false;
    let mut quote: Option<char> = None;

    for c in args.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_path = true;
            }
            None if c.is_whitespace() => {
                if in_path {
                    paths.push(PathBuf::from(std::mem::take(&mut current)));
                    in_path = false;
                }
            }
            None => {
                current.push(c);
                in_path = true;
            }
        }
    }
    if in_path {
        paths.push(PathBuf::from(current));
    }
    paths
}

/// Read files from disk; the upload name is the file name without directories.
fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("Not a file: {}", path.display()))?;
            Ok(UploadedFile::new(name, bytes))
        })
        .collect()
}

fn resolve_api_key(flag: Option<String>, config: &Config) -> Option<String> {
    flag.or_else(|| std::env::var(&config.llm.api_key_env).ok())
        .filter(|k| !k.trim().is_empty())
}

fn prompt_api_key() -> Result<String> {
    let key = dialoguer::Password::new()
        .with_prompt("LLM API key")
        .allow_empty_password(true)
        .interact()?;
    Ok(key)
}

/// Turn a session error into a user-facing message, listing skipped files.
fn describe(err: SessionError) -> anyhow::Error {
    match err {
        SessionError::NoSegments { skipped } => {
            let details: Vec<String> = skipped
                .iter()
                .map(|s| format!("  {}: {}", s.name, s.reason))
                .collect();
            anyhow::anyhow!(
                "no text could be extracted from the uploaded files\n{}",
                details.join("\n")
            )
        }
        other => anyhow::Error::new(other),
    }
}

fn print_report(report: &ProcessReport) {
    for skipped in &report.skipped {
        eprintln!("Warning: skipped {}: {}", skipped.name, skipped.reason);
    }
    println!(
        "Processed {} file(s): {} segments, {} chunks.",
        report.files - report.skipped.len(),
        report.segments,
        report.chunks
    );
}

fn print_message(message: &ChatMessage) {
    let who = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    };
    println!("{}: {}", who, message.content);

    if !message.sources.is_empty() {
        println!("\nSources:");
        for (i, source) in message.sources.iter().enumerate() {
            let location = match source.page {
                Some(page) => format!("{} (page {})", source.source, page),
                None => source.source.clone(),
            };
            let excerpt = source.excerpt.split_whitespace().collect::<Vec<_>>().join(" ");
            println!("  [{}] {}: {}", i + 1, location, excerpt);
        }
    }
}

fn extract(cfg: &Config, paths: &[PathBuf]) -> Result<()> {
    let uploads = read_uploads(paths)?;
    let options = LoadOptions {
        enable_presentations: cfg.loader.enable_presentations,
    };
    let counter = create_counter(&cfg.chunking)?;
    let splitter = RecursiveSplitter::new(cfg.chunking.max_tokens, cfg.chunking.overlap_tokens, counter);

    for upload in &uploads {
        match load_file(upload, options) {
            Ok(segments) => {
                let chunks = splitter.split_segments(&segments);
                println!(
                    "{}: {} segments, {} chunks",
                    upload.name,
                    segments.len(),
                    chunks.len()
                );
                for segment in &segments {
                    let label = segment
                        .page
                        .map(|p| format!("page {}", p))
                        .unwrap_or_else(|| "document".to_string());
                    let preview: String = segment.text.chars().take(80).collect();
                    println!(
                        "  {} ({} tokens): {}",
                        label,
                        splitter.counter().count(&segment.text),
                        preview.split_whitespace().collect::<Vec<_>>().join(" ")
                    );
                }
            }
            Err(e) => println!("{}: skipped ({})", upload.name, e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_paths_plain() {
        assert_eq!(
            split_paths("  a.pdf   b.docx "),
            vec![PathBuf::from("a.pdf"), PathBuf::from("b.docx")]
        );
        assert!(split_paths("   ").is_empty());
    }

    #[test]
    fn test_split_paths_quoted_spaces() {
        assert_eq!(
            split_paths(r#"notes.pdf "My Documents/q3 report.docx" 'old deck.pptx'"#),
            vec![
                PathBuf::from("notes.pdf"),
                PathBuf::from("My Documents/q3 report.docx"),
                PathBuf::from("old deck.pptx"),
            ]
        );
    }

    #[test]
    fn test_split_paths_quote_inside_path() {
        assert_eq!(
            split_paths(r#"/tmp/"annual report".pdf"#),
            vec![PathBuf::from("/tmp/annual report.pdf")]
        );
    }
}
