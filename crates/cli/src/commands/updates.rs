//! Update watching.

use std::sync::Arc;

use marketplace_client::lifecycle::TracingNavigator;
use marketplace_client::notify::TracingNotifier;
use marketplace_client::update::{HttpUpdateWorker, UpdateNotifier};

use super::{App, CliError};

/// Follow the version manifest until ctrl-c.
pub async fn watch(app: &App) -> Result<(), CliError> {
    let updates = &app.config.updates;
    let worker = HttpUpdateWorker::new(updates)?;

    tracing::info!(
        manifest = %updates.manifest_url,
        running = %updates.build_version,
        "Watching for updates (ctrl-c to stop)"
    );

    let handle = UpdateNotifier::new(
        Arc::new(worker),
        Arc::new(TracingNotifier),
        Arc::new(TracingNavigator),
        updates.poll_interval,
    )
    .spawn();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            }
        }
        clean = handle.join() => {
            tracing::warn!(clean, "Update watcher stopped");
        }
    }
    Ok(())
}
