//! Signal handling for the worker loop.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Install a handler that cancels the returned token on SIGTERM or SIGINT.
///
/// The worker checks the token between iterations, so an evaluation that is
/// already running finishes before the process exits.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, stopping after the current evaluation");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, stopping after the current evaluation");
            }
        }

        token_clone.cancel();
    });

    Ok(token)
}
