use anyhow::Result;
use clap::{Parser, Subcommand};

mod config;
mod envelope;
#[cfg(feature = "stdio")]
mod mcp;
mod ops;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "pdfscope")]
#[command(
    about = "Selective PDF queries: page ranges, bounded pattern search, outlines (MCP stdio server)",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for Cursor / MCP clients).
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Print version info.
    Version(VersionCmd),
    /// Document metadata (json).
    Info(ops::InfoArgs),
    /// Resolve a page-range expression (json).
    ResolvePages(ops::ResolvePagesArgs),
    /// Extract text for selected pages (json).
    ReadPages(ops::ReadPagesArgs),
    /// Search selected pages for a pattern (json).
    Search(ops::SearchArgs),
    /// Bookmark tree or flattened list (json).
    Outline(ops::OutlineArgs),
    /// Compile a pattern without scanning a document (json).
    ValidatePattern(ops::ValidatePatternArgs),
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Opt-in `KEY=VALUE` file named by `PDFSCOPE_ENV_FILE`.
///
/// Only fills variables that are unset in the process environment, and never logs values.
fn load_env_file() {
    let Ok(p) = std::env::var("PDFSCOPE_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

/// Logs go to stderr only: stdout carries the MCP stream or the CLI's JSON.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("PDFSCOPE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    // `try_init` also installs the `log` bridge, so parser crates logging via `log` land here too.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn emit(payload: serde_json::Value) -> Result<()> {
    println!("{payload}");
    if payload["ok"].as_bool() == Some(false) {
        let msg = payload["error"]["message"].as_str().unwrap_or("operation failed");
        anyhow::bail!("{msg}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();
    let cfg = ServerConfig::from_env();
    tracing::debug!(?cfg, "configuration loaded");

    match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            mcp::serve_stdio(cfg)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": envelope::SCHEMA_VERSION,
                "kind": "version",
                "ok": true,
                "name": "pdfscope",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("pdfscope {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
        Commands::Info(args) => emit(ops::info(&cfg, args).await)?,
        Commands::ResolvePages(args) => emit(ops::resolve_pages(&cfg, args).await)?,
        Commands::ReadPages(args) => emit(ops::read_pages(&cfg, args).await)?,
        Commands::Search(args) => emit(ops::search(&cfg, args).await)?,
        Commands::Outline(args) => emit(ops::outline(&cfg, args).await)?,
        Commands::ValidatePattern(args) => emit(ops::validate_pattern(args))?,
    }
    Ok(())
}
