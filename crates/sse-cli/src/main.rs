//! sse-cli - follow a Server-Sent Events stream from the terminal
//!
//! Prints every event as it arrives, reconnecting with `Last-Event-ID`
//! whenever the server ends the stream.

mod config;
mod output;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sse_client::{EventSource, EventSourceConfig, ServerEvent, Subscriber};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{parse_header, Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "sse-cli")]
#[command(author, version, about = "Server-Sent Events stream follower")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SSE_CLI_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Only print events
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to a stream and print its events
    Listen {
        /// Stream URL
        url: String,

        /// Resume after this event id
        #[arg(long)]
        last_event_id: Option<String>,

        /// Initial reconnection interval in milliseconds
        #[arg(long)]
        reconnect_ms: Option<u64>,

        /// Extra request header, as NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Exit after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

/// What the subscriber callbacks hand back to the main task
enum Notice {
    Event(ServerEvent),
    Exception(String),
    Complete,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    match cli.command {
        Commands::Listen {
            url,
            last_event_id,
            reconnect_ms,
            headers,
            count,
        } => {
            let merged = config.merge_with_args(
                cli.format.map(|format| format.as_str()),
                cli.no_color,
                reconnect_ms,
                &headers,
            );
            tracing::debug!(?merged, "Resolved configuration");
            let format = OutputFormat::from_name(&merged.output)
                .with_context(|| format!("Unknown output format: {}", merged.output))?;
            let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

            let source_config = build_source_config(&url, last_event_id, &merged);
            listen(source_config, count, &ctx).await?;
        }
    }

    Ok(())
}

fn build_source_config(
    url: &str,
    last_event_id: Option<String>,
    merged: &MergedConfig,
) -> EventSourceConfig {
    let mut source_config = EventSourceConfig::new(url)
        .reconnect_interval(Duration::from_millis(merged.reconnect_ms));
    if let Some(id) = last_event_id {
        source_config = source_config.last_event_id(id);
    }
    for (name, value) in &merged.headers {
        source_config = source_config.header(name.clone(), value.clone());
    }
    source_config
}

/// Follow one stream until Ctrl+C, the event limit, or the source closing
async fn listen(config: EventSourceConfig, count: Option<usize>, ctx: &OutputContext) -> Result<()> {
    let source = EventSource::new(config).context("Failed to create event source")?;
    let notices = subscribe(&source);

    ctx.info(&format!("Listening on {}", source.url()));
    ctx.info("Press Ctrl+C to stop");
    source.start().context("Failed to start event source")?;

    follow(&source, notices, count, ctx, tokio::signal::ctrl_c()).await;
    source.close().await;
    Ok(())
}

/// Forward every callback of `source` to the returned channel
fn subscribe(source: &EventSource) -> mpsc::UnboundedReceiver<Notice> {
    let (tx, rx) = mpsc::unbounded_channel();

    let events = tx.clone();
    let exceptions = tx.clone();
    let completions = tx;
    source.register(
        Subscriber::new(move |event| {
            let _ = events.send(Notice::Event(event.clone()));
        })
        .on_exception(move |err| {
            let _ = exceptions.send(Notice::Exception(err.to_string()));
        })
        .on_complete(move || {
            let _ = completions.send(Notice::Complete);
        }),
    );

    rx
}

/// Print notices until `shutdown` resolves, `count` events were printed, or
/// the source closed; returns the number of events printed
///
/// `shutdown` is polled from one pinned future for the whole loop, so a
/// signal listener registered by it stays installed between notices.
async fn follow<F: Future>(
    source: &EventSource,
    mut rx: mpsc::UnboundedReceiver<Notice>,
    count: Option<usize>,
    ctx: &OutputContext,
    shutdown: F,
) -> usize {
    let mut received = 0usize;
    let mut poll = tokio::time::interval(Duration::from_millis(200));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            notice = rx.recv() => match notice {
                Some(Notice::Event(event)) => {
                    ctx.print_event(&event);
                    received += 1;
                    if count.is_some_and(|limit| received >= limit) {
                        break;
                    }
                }
                Some(Notice::Exception(message)) => ctx.error(&format!("Stream error: {}", message)),
                Some(Notice::Complete) => ctx.warn("Stream ended, reconnecting"),
                None => break,
            },
            _ = &mut shutdown => {
                ctx.info("\nStopping...");
                break;
            }
            _ = poll.tick() => {
                if source.ready_state().is_closed() && rx.is_empty() {
                    ctx.info("Event source closed");
                    break;
                }
            }
        }
    }

    received
}
