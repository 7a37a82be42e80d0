//! Bot runtime - long-connection runner.

use tracing::{info, warn};

use crate::feishu::LongConnClient;

/// Run the long-connection worker until a fatal connection error or a
/// termination signal.
///
/// Shutdown is abrupt by design: in-flight handler tasks are dropped
/// with the runtime, and their child processes are killed rather than
/// drained.
pub async fn run(worker: LongConnClient) -> anyhow::Result<()> {
    tokio::select! {
        result = worker.run() => {
            // run() only returns on fatal connection errors.
            result?;
            Ok(())
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, exiting");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(error) => {
            warn!("failed to install SIGTERM handler: {error}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
