//! tallyd: receipt extraction daemon.
//!
//! Watches an inbox directory for scanned receipts, extracts structured line
//! items through OCR + LLM, reconciles the stated total against the item sum,
//! and writes one JSON record per receipt plus an append-only CSV log.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tally_core::{
    CompletionProvider, DocIntelligenceClient, GeminiClient, LayoutOcr, Pipeline, ResultStore,
};
use tally_daemon::config::{default_config_path, load_config, Config};
use tally_daemon::run::run_loop;
use tally_daemon::watcher::ReceiptWatcher;

#[derive(Parser)]
#[command(name = "tallyd")]
#[command(about = "Tally daemon - watches a folder and extracts receipt records")]
#[command(version)]
struct Args {
    /// Directory to watch for receipt images
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Directory records are written to
    #[arg(long)]
    out: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Settle delay in milliseconds before reading a new arrival
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "Failed to load config from {}: {}. Using defaults.",
                config_path.display(),
                err
            );
            Config::default()
        }
    };

    init_logging(args.log_file.clone().or_else(|| config.log_file()))?;

    let watch_dir = args.dir.clone().unwrap_or_else(|| config.watch_dir());
    let output_dir = args.out.clone().unwrap_or_else(|| config.output_dir());
    std::fs::create_dir_all(&watch_dir)
        .with_context(|| format!("Failed to create watch directory {}", watch_dir.display()))?;

    // Both collaborators are built once, before watching starts; missing
    // credentials abort startup instead of degrading into a null client.
    let ocr = DocIntelligenceClient::from_env().context("OCR collaborator unavailable")?;
    let mut llm = GeminiClient::from_env().context("LLM collaborator unavailable")?;
    if let Some(model) = config.llm_model() {
        llm = llm.with_model(model);
    }
    tracing::info!("Collaborators ready (model: {})", llm.model());

    let store = ResultStore::new(&output_dir)
        .with_context(|| format!("Failed to open result store at {}", output_dir.display()))?;
    let pipeline = Pipeline::new(ocr, llm, store);

    let settle = args
        .settle_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| config.settle_delay());
    let mut watcher =
        ReceiptWatcher::new(settle, &config.extensions()).context("Failed to create file watcher")?;
    watcher.watch(&watch_dir)?;
    tracing::info!(
        "Watching {} (records in {})",
        watch_dir.display(),
        output_dir.display()
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    rt.block_on(async_main(watcher, pipeline))
}

/// Route logs to stderr, or to a log file opened once at startup.
fn init_logging(log_file: Option<PathBuf>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create log directory for {}", path.display()))?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Run the dispatch loop until a shutdown signal arrives.
async fn async_main<O, C>(watcher: ReceiptWatcher, pipeline: Pipeline<O, C>) -> Result<()>
where
    O: LayoutOcr,
    C: CompletionProvider,
{
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        () = run_loop(watcher, pipeline) => {}
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, shutting down");
        }
    }

    tracing::info!("tallyd stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["tallyd"]);
        assert!(args.dir.is_none());
        assert!(args.out.is_none());
        assert!(args.config.is_none());
        assert!(args.settle_ms.is_none());
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_args_settle_override() {
        let args = Args::parse_from(["tallyd", "--settle-ms", "750"]);
        assert_eq!(args.settle_ms, Some(750));
    }

    #[test]
    fn test_args_custom_paths() {
        let args = Args::parse_from([
            "tallyd",
            "--dir",
            "/data/inbox",
            "--out",
            "/data/records",
            "--config",
            "/etc/tally.toml",
            "--log-file",
            "/var/log/tallyd.log",
        ]);

        assert_eq!(args.dir.as_deref(), Some(Path::new("/data/inbox")));
        assert_eq!(args.out.as_deref(), Some(Path::new("/data/records")));
        assert_eq!(args.config.as_deref(), Some(Path::new("/etc/tally.toml")));
        assert_eq!(args.log_file.as_deref(), Some(Path::new("/var/log/tallyd.log")));
    }
}
