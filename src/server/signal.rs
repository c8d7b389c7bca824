// Signal handling module
//
// SIGTERM and SIGINT (Ctrl+C) trigger a graceful shutdown: the accept loop
// stops and in-flight connections are given time to finish.

use std::sync::Arc;

use tokio::sync::Notify;

/// Register the shutdown signals and notify `shutdown` when one arrives
///
/// Must be called from within the runtime.
#[cfg(unix)]
pub fn spawn_signal_listener(shutdown: Arc<Notify>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tracing::debug!("[SIGNAL] Handlers registered (pid {})", std::process::id());

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        tracing::info!("[SIGNAL] {name} received, initiating graceful shutdown");
        shutdown.notify_one();
    });
    Ok(())
}

/// Non-Unix fallback: Ctrl+C only
#[cfg(not(unix))]
pub fn spawn_signal_listener(shutdown: Arc<Notify>) -> std::io::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("[SIGNAL] Ctrl+C received, initiating graceful shutdown");
            shutdown.notify_one();
        }
    });
    Ok(())
}
