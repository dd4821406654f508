//! # wwks-runner
//!
//! Console front end for the WWKS pickup client.
//!
//! Loads a JSON configuration file, starts the engine, connects to the
//! configured robot and reads operator commands from stdin. Engine events
//! are written to the log.
//!
//! # Usage
//!
//! ```bash
//! wwks-runner config.json --log-level info
//! wwks-runner config.json --host 10.0.0.12 --port 6050
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use wwks_engine::{Engine, EngineContext, EngineEvent, EngineHandle, OutputIntent};

use crate::commands::Command;

/// WWKS robot pickup client.
#[derive(Parser)]
#[command(name = "wwks-runner", about = "WWKS robot pickup client", version)]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `module.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Robot host. Overrides `robot.host`.
    #[arg(long)]
    host: Option<String>,

    /// Robot port. Overrides `robot.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut config = wwks_core::config::load_config(&cli.config)?;
    if let Some(host) = cli.host.clone() {
        config.robot.host = host;
    }
    if let Some(port) = cli.port {
        config.robot.port = port;
    }

    // 2. Initialize logging
    let module_name = config.module_name("wwks-runner");
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    wwks_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &module_name);

    info!(
        "{module_name} starting, config={} robot={}:{} source={}",
        cli.config.display(),
        config.robot.host,
        config.robot.port,
        config.client.source_id,
    );

    // 3. Start the engine and connect (validates the command-line overrides too)
    let (engine, task) = Engine::start(EngineContext::from_config(&config))?;
    let mut events = engine.subscribe().await?;
    engine.connect(config.robot.host.clone(), config.robot.port)?;

    info!("{}", commands::HELP);

    // 4. Drive stdin commands and engine events until quit or Ctrl+C
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                break;
            }
            Some(event) = events.recv() => log_event(&event),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match commands::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = run_command(&engine, command).await {
                            error!("[runner] {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("[runner] {e}; {}", commands::HELP),
                },
                Ok(None) => {
                    info!("[runner] stdin closed, waiting for Ctrl+C");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("[runner] stdin read failed: {e}");
                    stdin_open = false;
                }
            },
        }
    }

    // 5. Stop the engine gracefully
    if let Err(e) = engine.shutdown() {
        warn!("engine already stopped: {e}");
    }
    if let Err(e) = task.await {
        error!("engine task failed: {e}");
    }

    info!("{module_name} stopped");
    Ok(())
}

async fn run_command(engine: &EngineHandle, command: Command) -> wwks_core::error::Result<()> {
    match command {
        Command::Refresh => engine.refresh(),
        Command::Output {
            article_id,
            quantity,
        } => {
            let intent = engine
                .request_output(article_id.clone(), quantity, None, None)
                .await?;
            match intent {
                OutputIntent::Created(id) => {
                    info!("[runner] output {id} requested: {quantity} x {article_id}")
                }
                OutputIntent::Redirected(id) => {
                    info!("[runner] {article_id} already has open order {id}, status requested")
                }
            }
            Ok(())
        }
        Command::Search(term) => engine.search(term),
        Command::Cancel => engine.cancel_debounce(),
        Command::Stock => {
            let snapshot = engine.snapshot().await?;
            info!(
                "[runner] {} [{}], {} article(s)",
                snapshot.connection,
                snapshot.status_text,
                snapshot.stock.len()
            );
            for item in &snapshot.stock {
                info!(
                    "  {:<12} {:>4}  {:?}  {} {} {}",
                    item.article_id,
                    item.quantity,
                    item.display,
                    item.name,
                    item.dosage_form,
                    item.packaging_unit,
                );
            }
            Ok(())
        }
        Command::Orders => {
            let snapshot = engine.snapshot().await?;
            info!("[runner] {} open order(s)", snapshot.orders.len());
            for order in &snapshot.orders {
                info!(
                    "  {:<10} {:<12} x{:<3} {}",
                    order.order_id,
                    order.article_id,
                    order.requested_quantity,
                    order.state
                );
            }
            Ok(())
        }
        Command::Help => {
            info!("{}", commands::HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::ArticleChanged {
            article_id,
            quantity,
            display: display_value,
        } => {
            info!("[stock] {article_id} qty={quantity} display={display_value:?}")
        }
        EngineEvent::OrderChanged {
            order_id,
            article_id,
            state,
        } => {
            info!("[order] {order_id} ({article_id}) -> {state}")
        }
        EngineEvent::ConnectivityChanged { state, status_text } => {
            info!("[robot] {state} [{status_text}]")
        }
    }
}
