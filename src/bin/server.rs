use clap::Parser;
use std::sync::Arc;
use streamdis::codec::FrameCodec;
use streamdis::config::Config;
use streamdis::server::Server;
use streamdis::source::Hub;
use streamdis::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let shutdown = CancellationToken::new();
    // Nothing feeds this hub, see the long help. Embedders bring their own source.
    let server = Server::bind(config.bind_address(), Arc::new(Hub::new()), shutdown.clone())
        .await?
        .with_codec(FrameCodec::new(config.max_frame_size));

    tokio::spawn(async move {
        termination().await;
        info!("Shutdown requested, draining connections. Signal again to exit immediately");
        shutdown.cancel();

        // Idle clients keep their sessions open, the second signal drops them all.
        termination().await;
        warn!("Exiting without waiting for open connections");
        std::process::exit(130);
    });

    server.serve().await;

    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn termination() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
