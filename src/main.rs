//! LevelTrader - Main Entry Point
//!
//! Replays a JSON-lines event feed against the paper gateway.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use level_trader::bot::{pump_events, LevelTrader, PaperGateway};
use level_trader::common::channels::create_event_channel;
use level_trader::common::traits::{Clock, ManualClock};
use level_trader::common::types::{Bar, BotEvent};
use level_trader::config::load_config;

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "level_trader.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); defaults to settings.log_level
    #[arg(long, env = "LEVEL_TRADER_LOG")]
    log_level: Option<String>,

    /// JSON-lines event feed to replay, `-` for stdin
    #[arg(short, long, default_value = "-")]
    feed: String,
}

fn parse_level(raw: &str) -> Level {
    match raw.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = load_config(Some(&args.config)).context("failed to load configuration")?;

    // Initialize logging
    let level = parse_level(args.log_level.as_deref().unwrap_or(&config.settings.log_level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting LevelTrader");
    info!("Configuration file: {}", args.config);

    let paper = PaperGateway::new(&config.paper, config.instrument.spec.clone());
    let clock = ManualClock::new(Utc::now());

    let mut trader = match LevelTrader::start(&config, paper.clone(), clock.clone()).await {
        Ok(trader) => trader,
        Err(e) => {
            for violation in e.violations() {
                error!("WARNING: {}", violation);
            }
            error!("App contains validation errors and will be stopped");
            return Err(e.into());
        }
    };

    let (tx, mut rx) = create_event_channel();
    let feed = args.feed.clone();
    let reader = tokio::spawn(async move {
        if feed == "-" {
            pump_events(BufReader::new(tokio::io::stdin()), tx).await
        } else {
            let file = tokio::fs::File::open(&feed).await?;
            pump_events(BufReader::new(file), tx).await
        }
    });

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    info!("Event feed closed");
                    break;
                };

                // Replays run on feed time
                let bar = match &event {
                    BotEvent::Bar(bar) => Some(bar.clone()),
                    BotEvent::Tick(tick) => Some(Bar::from(tick)),
                    _ => None,
                };
                if let Some(bar) = &bar {
                    clock.set(bar.timestamp);
                }

                let shutdown = matches!(event, BotEvent::Shutdown);
                let report = trader.handle_event(event).await;
                for err in &report.errors {
                    warn!("{}", err);
                }
                if shutdown {
                    break;
                }

                if let Some(bar) = bar {
                    for position_event in paper.settle(&bar).await {
                        let report = trader.handle_event(position_event.into()).await;
                        for err in &report.errors {
                            warn!("{}", err);
                        }
                    }
                }

                if trader.is_finished() {
                    info!("All plans finished");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, cleaning up...");
                break;
            }
        }
    }

    let report = trader.shutdown().await;
    for err in &report.errors {
        warn!("{}", err);
    }
    reader.abort();

    for machine in trader.plans().iter() {
        info!(
            correlation_id = %machine.correlation_id(),
            phase = %machine.phase(),
            outcome = ?machine.state().outcome(),
            "Plan summary"
        );
    }
    info!(at = %clock.now(), "LevelTrader stopped");

    Ok(())
}
