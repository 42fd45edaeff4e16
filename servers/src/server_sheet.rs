use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lib_sheetcast::Hub;
use lib_sheetcast::loggers::setup_logging;
use tokio::signal;
use tracing::{error, info, warn};

mod sheet_logic;
use sheet_logic::{config, downstream, upstream};

const APP_NAME: &str = "server_sheet";

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Ctrl-C received, initiating shutdown."),
                    _ = term_signal.recv() => info!("SIGTERM received, initiating shutdown."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                signal::ctrl_c().await.ok();
                info!("Ctrl-C received, initiating shutdown.");
            }
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.ok();
        info!("Ctrl-C received, initiating shutdown.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings = config::load_config()?;
    let _log_guard = setup_logging(&settings.log_dir, &settings.log_level, APP_NAME)?;
    info!("{}", settings);

    let source = upstream::build_source(&settings)?;

    let hub = Arc::new(Hub::new());
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let mut upstream_handle = tokio::spawn(upstream::run(source, settings.clone(), hub.clone(), shutdown_tx.subscribe()));
    let mut downstream_handle = tokio::spawn(downstream::run(settings, hub, shutdown_tx.subscribe()));

    let mut upstream_done = false;
    let early_exit = tokio::select! {
        _ = shutdown_signal() => None,
        res = &mut downstream_handle => Some(res),
        res = &mut upstream_handle => {
            upstream_done = true;
            if let Err(e) = res {
                error!("Upstream task panicked: {}", e);
            } else {
                error!("Upstream stopped unexpectedly");
            }
            None
        }
    };

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    let downstream_result = match early_exit {
        Some(res) => res,
        None => match tokio::time::timeout(Duration::from_secs(10), &mut downstream_handle).await {
            Ok(res) => res,
            Err(_) => {
                warn!("Downstream server did not stop in time");
                downstream_handle.abort();
                Ok(Ok(()))
            }
        },
    };
    let mut failure = match downstream_result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => Some(anyhow::Error::from(e)),
    };

    if upstream_done {
        failure.get_or_insert_with(|| anyhow::anyhow!("Upstream stopped unexpectedly"));
    } else {
        match tokio::time::timeout(Duration::from_secs(10), &mut upstream_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Upstream task panicked: {}", e),
            Err(_) => {
                warn!("Upstream did not stop in time");
                upstream_handle.abort();
            }
        }
    }

    info!("Shutdown complete.");
    match failure {
        Some(e) => {
            error!("Server failed: {:#}", e);
            Err(e)
        }
        None => Ok(()),
    }
}
