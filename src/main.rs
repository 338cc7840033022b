use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paydispatch::application::aggregator::Aggregator;
use paydispatch::application::worker::{WorkerPool, join_workers};
use paydispatch::bootstrap;
use paydispatch::config::Config;
use paydispatch::interfaces::http::{self, AppState};
use paydispatch::logging::init_logging;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    config.validate().into_diagnostic()?;
    init_logging(&config);

    let ledger = bootstrap::ledger(&config).into_diagnostic()?;
    let dispatcher = Arc::new(bootstrap::dispatcher(&config).into_diagnostic()?);
    let queue = bootstrap::queue(&config).await.into_diagnostic()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = Arc::new(WorkerPool::new(
        queue.clone(),
        dispatcher,
        ledger.clone(),
        config.retry_policy(),
    ));
    let workers = pool.spawn(config.max_workers, shutdown_rx);
    info!(workers = config.max_workers, "Worker pool started");

    let state = AppState {
        queue: queue.clone(),
        aggregator: Aggregator::new(ledger),
    };
    let served = http::serve(config.listen, state, shutdown_signal()).await;

    // Stop handing out messages; workers finish what they hold and exit.
    let _ = shutdown_tx.send(true);
    queue.close().await;
    join_workers(workers).await;
    info!("Shutdown complete");

    served.into_diagnostic()
}

/// Resolves on SIGINT or SIGTERM. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    };
    warn!(signal = received, "Received shutdown signal");
}
