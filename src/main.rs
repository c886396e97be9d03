mod config;
mod donation;
mod draw;
mod http;
mod ingest;
mod ledger;
mod models;
mod session;
mod source;
mod state;

use std::sync::Arc;

use crate::config::{RaffleConfig, SourceKind};
use crate::draw::{DrawState, RngPicker, TicketPicker};
use crate::ingest::DonationPoller;
use crate::session::RaffleSession;
use crate::source::{DonationSource, LivePixClient, Simulator};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = RaffleConfig::load().context("Failed to load configuration")?;

    let simulator_seed = config.draw.seed.unwrap_or_else(rand::random);
    let simulator = Arc::new(Simulator::new(
        simulator_seed,
        config.source.simulator_batch_size,
    ));
    let source: Arc<dyn DonationSource> = match config.source.kind {
        SourceKind::Livepix => {
            let client = LivePixClient::new(
                config.source.base_url()?,
                config.source.request_timeout(),
                config.source.max_records,
            )
            .context("Failed to initialize LivePix client")?;
            info!(
                timeout_ms = client.timeout().as_millis() as u64,
                "Using LivePix proxy as donation source"
            );
            Arc::new(client)
        }
        SourceKind::Simulator => {
            info!("Using simulated donation source");
            simulator.clone()
        }
    };
    let simulator = config.draw.simulator_enabled.then_some(simulator);

    let picker: Box<dyn TicketPicker> = match config.draw.seed {
        Some(seed) => {
            info!(seed, "Draws use a seeded picker");
            Box::new(RngPicker::seeded(seed))
        }
        None => Box::new(RngPicker::from_entropy()),
    };

    let session = RaffleSession::new(source, simulator, picker, &config.draw);
    let app_state = AppState::new(Arc::clone(&session));
    tokio::spawn(announce_draws(session.subscribe()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = if config.ingest.enabled {
        let poller = DonationPoller::new(
            Arc::clone(&session),
            config.ingest.fetch_range()?,
            config.ingest.poll_interval(),
        );
        Some(tokio::spawn(poller.run(shutdown_rx)))
    } else {
        info!("Background ingest disabled");
        None
    };

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Raffle API listening on {local_addr}");

    let router: Router = http::router(app_state);
    let server = axum::serve(listener, router.into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    session.shutdown();
    if let Some(handle) = poller_handle {
        if let Err(join_err) = handle.await {
            error!("Poller task join error: {join_err}");
        }
    }

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false);
    if std::env::var("RAFFLE_API_LOG_FORMAT").is_ok_and(|format| format == "json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

/// Mirrors every draw transition into the log until the session goes away.
async fn announce_draws(mut states: watch::Receiver<DrawState>) {
    while states.changed().await.is_ok() {
        let message = states.borrow_and_update().message();
        info!("{message}");
    }
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
