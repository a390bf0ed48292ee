//! Main entry point for the xSwap service.
//!
//! Loads configuration, assembles the swap engine and serves the HTTP API.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use xswap_config::Config;
use xswap_core::{EngineBuilder, SwapEngine};
use xswap_types::{DelegateEvent, EngineEvent, StepEvent, SwapEvent};

mod apis;
mod server;

/// Command-line arguments for the xSwap service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started xSwap");

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!(chain_id = config.engine.chain_id, "Loaded configuration");

	let handle = EngineBuilder::new(config.clone()).build()?;
	let engine = handle.engine;
	tokio::spawn(log_events(Arc::clone(&engine)));

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			tokio::select! {
				result = server::start_server(api_config, engine) => {
					tracing::info!("API server finished");
					result?;
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Shutting down");
				}
			}
		},
		None => {
			tracing::info!("API disabled, waiting for shutdown signal");
			tokio::signal::ctrl_c().await?;
		},
	}

	tracing::info!("Stopped xSwap");
	Ok(())
}

/// Logs every engine event until the bus closes.
async fn log_events(engine: Arc<SwapEngine>) {
	let mut events = engine.event_bus().subscribe();
	loop {
		match events.recv().await {
			Ok(SwapEvent::Step(StepEvent::Executed {
				step_hash, account, ..
			})) => {
				tracing::info!(step = %step_hash, %account, "Step executed");
			},
			Ok(SwapEvent::Delegate(DelegateEvent::Deployed { account, delegate })) => {
				tracing::info!(%account, %delegate, "Delegate deployed");
			},
			Ok(SwapEvent::Delegate(DelegateEvent::Withdrawn {
				account, caller, ..
			})) => {
				tracing::info!(%account, %caller, "Delegate withdrawal");
			},
			Ok(SwapEvent::Engine(EngineEvent::Withdrawn { caller, items })) => {
				tracing::info!(%caller, items, "Engine withdrawal");
			},
			Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
				tracing::warn!(skipped, "Event logger lagged");
			},
			Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
		}
	}
}
