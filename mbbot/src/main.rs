//! mbbot - MusicBrainz URL maintenance bot
//!
//! Reads identifiers from stdin, one per line, and either rewrites the URLs
//! they identify (`--action urls`, MBIDs) or cancels edits (`--action cancel`,
//! numeric edit IDs). Failures for one identifier are logged and the bot moves
//! on to the next; malformed input stops the run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mbbot::processor::cancel_edit;
use mbbot::{EditOptions, Processor, RuleTable, Session, SessionOptions};
use mbbot_common::config::{
    load_toml_config, resolve_config_path, CliOverrides, Credentials, Settings, TomlConfig,
};
use mbbot_common::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Update URLs corresponding to MBIDs read from stdin
    Urls,
    /// Cancel edits with IDs read from stdin
    Cancel,
}

/// Command-line arguments for mbbot
#[derive(Parser, Debug)]
#[command(name = "mbbot")]
#[command(about = "Maintains URL relationships on a MusicBrainz server")]
#[command(version)]
struct Args {
    /// Action to perform
    #[arg(long, value_enum)]
    action: Action,

    /// TOML configuration file
    #[arg(long, env = "MBBOT_CONFIG")]
    config: Option<PathBuf>,

    /// File containing whitespace-separated username and password
    #[arg(long, env = "MBBOT_CREDS")]
    creds: Option<PathBuf>,

    /// Don't actually perform any edits
    #[arg(long)]
    dry_run: bool,

    /// Edit note to attach to all edits
    #[arg(long)]
    edit_note: Option<String>,

    /// Force voting on edits
    #[arg(long)]
    make_votable: bool,

    /// Base URL of MusicBrainz server
    #[arg(long, env = "MBBOT_SERVER")]
    server: Option<String>,

    /// Maximum requests per second
    #[arg(long, env = "MBBOT_MAX_QPS")]
    max_qps: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };

    let settings = Settings::resolve(
        CliOverrides {
            server_url: args.server.clone(),
            credentials_file: args.creds.clone(),
            max_qps: args.max_qps,
        },
        &toml_config,
    )?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting mbbot v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) if path.exists() => info!(path = %path.display(), "Loaded config"),
        Some(path) => warn!(path = %path.display(), "Config file not found, using defaults"),
        None => warn!("No config directory found, using defaults"),
    }

    let creds = Credentials::load(&settings.credentials_file).with_context(|| {
        format!(
            "Failed reading credentials from {}",
            settings.credentials_file.display()
        )
    })?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    if args.dry_run {
        info!("Dry run: edits will be logged but not submitted");
    }
    let session = Session::new(SessionOptions::from_settings(&settings, args.dry_run), cancel.clone())?;
    info!(user = %creds.username, server = %settings.server_url, "Logging in");
    session.login(&creds).await.context("Failed logging in")?;

    match args.action {
        Action::Urls => {
            let rules = RuleTable::standard().context("Failed to build rewrite rules")?;
            let options = EditOptions {
                edit_note: args.edit_note.clone(),
                make_votable: args.make_votable,
            };
            run_urls(&Processor::new(&session, &rules, options), &cancel).await
        }
        Action::Cancel => {
            let note = args.edit_note.as_deref().unwrap_or_default();
            run_cancel(&session, note, &cancel).await
        }
    }
}

async fn run_urls(processor: &Processor<'_, Session>, cancel: &CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (mut processed, mut failed) = (0usize, 0usize);

    while let Some(line) = next_input(&mut lines, cancel).await? {
        let mbid = parse_mbid(&line)?;

        processed += 1;
        match processor.process(&mbid).await {
            Ok(report) if report.is_empty() => {}
            Ok(report) => info!(
                mbid = %mbid,
                edits = report.edit_ids.len(),
                edited_relationships = report.edited_relationships,
                created_relationships = report.created_relationships.len(),
                "Finished URL"
            ),
            Err(e) => {
                failed += 1;
                error!(
                    mbid = %mbid,
                    transient = e.is_transient(),
                    edits = ?e.report.edit_ids,
                    edited_relationships = e.report.edited_relationships,
                    created_relationships = ?e.report.created_relationships,
                    "Failed rewriting: {}",
                    e.source
                );
            }
        }
    }

    info!(processed, failed, "Done");
    Ok(())
}

async fn run_cancel(session: &Session, edit_note: &str, cancel: &CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = next_input(&mut lines, cancel).await? {
        let edit_id = parse_edit_id(&line)?;

        if let Err(e) = cancel_edit(session, edit_id, edit_note).await {
            error!(edit_id, "Failed cancelling edit: {}", e);
        }
    }
    Ok(())
}

/// Next non-blank trimmed input line, or `None` at EOF or once cancelled.
async fn next_input<R>(lines: &mut Lines<R>, cancel: &CancellationToken) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            line = lines.next_line() => line?,
        };
        match line {
            None => return Ok(None),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(Some(line.trim().to_string())),
        }
    }
}

/// Normalize a MusicBrainz ID read from input.
fn parse_mbid(line: &str) -> mbbot_common::Result<String> {
    Uuid::try_parse(line)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|_| Error::InvalidInput(format!("not an MBID: {:?}", line)))
}

fn parse_edit_id(line: &str) -> mbbot_common::Result<u64> {
    line.parse()
        .map_err(|_| Error::InvalidInput(format!("not an edit ID: {:?}", line)))
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, cancelling");
            cancel.cancel();
        }
        Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mbid() {
        assert_eq!(
            parse_mbid("0E8F52A1-0C5A-4E8D-9F1B-2D1B7F3C6A77").unwrap(),
            "0e8f52a1-0c5a-4e8d-9f1b-2d1b7f3c6a77"
        );
        assert!(parse_mbid("https://musicbrainz.org/url/abc").is_err());
        assert!(parse_mbid("12345").is_err());
    }

    #[test]
    fn test_parse_edit_id() {
        assert_eq!(parse_edit_id("98765").unwrap(), 98765);
        assert!(matches!(parse_edit_id("-1"), Err(Error::InvalidInput(_))));
        assert!(parse_edit_id("edit/1").is_err());
    }

    #[tokio::test]
    async fn test_next_input_skips_blank_lines() {
        let cancel = CancellationToken::new();
        let mut lines = BufReader::new(&b"\n  123 \n\t\n456\n"[..]).lines();
        assert_eq!(next_input(&mut lines, &cancel).await.unwrap().as_deref(), Some("123"));
        assert_eq!(next_input(&mut lines, &cancel).await.unwrap().as_deref(), Some("456"));
        assert_eq!(next_input(&mut lines, &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_input_stops_when_cancelled_while_waiting() {
        // Keep the writer open so the read blocks.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let next = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            next_input(&mut lines, &cancel),
        )
        .await
        .expect("read should stop on cancel");
        assert_eq!(next.unwrap(), None);
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "mbbot",
            "--action",
            "urls",
            "--dry-run",
            "--edit-note",
            "hello",
        ])
        .unwrap();
        assert_eq!(args.action, Action::Urls);
        assert!(args.dry_run);
        assert!(!args.make_votable);
        assert_eq!(args.edit_note.as_deref(), Some("hello"));

        assert!(Args::try_parse_from(["mbbot", "--action", "delete"]).is_err());
        assert!(Args::try_parse_from(["mbbot"]).is_err());
    }
}
