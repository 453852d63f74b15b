use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use custody_common::ProductLedger;
use custody_node::store::{self, SnapshotStore};
use custody_node::{router, AppState, Cli};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "custody_node=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.ledger_config();
    let store = cli.state_path().map(SnapshotStore::new);

    let state = match &store {
        Some(store) => match store.load().await? {
            Some(persisted) => {
                let state = AppState::restore(persisted, config, cli.event_buffer)
                    .with_context(|| format!("invalid snapshot in {}", store.path().display()))?;
                let products = state.read(|l| l.len()).await;
                info!(path = %store.path().display(), products, "restored ledger");
                state
            }
            None => {
                info!(path = %store.path().display(), "starting with an empty ledger");
                AppState::new(ProductLedger::new(config), cli.event_buffer)
            }
        },
        None => {
            warn!("running ephemeral, ledger will not survive a restart");
            AppState::new(ProductLedger::new(config), cli.event_buffer)
        }
    };

    let state = Arc::new(state);
    let writer = store
        .as_ref()
        .map(|store| store::spawn_writer(store.clone(), state.clone()));

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!(addr = %listener.local_addr()?, overpayment = ?config.overpayment, "custody node listening");

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    // Stop the background writer so it cannot race the final save.
    if let Some(writer) = writer {
        writer.abort();
        writer.await.ok();
    }
    if let Some(store) = store {
        store
            .save(&state.persisted().await)
            .await
            .context("failed to write final snapshot")?;
        info!(path = %store.path().display(), "final snapshot written");
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
