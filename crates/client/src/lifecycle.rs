//! Navigation and teardown collaborators.

/// Moves the visible view between routes.
pub trait Navigator: Send + Sync {
    /// Transition to `route` (e.g. `/`).
    fn navigate(&self, route: &str);

    /// Rebuild all in-memory state against the current build.
    ///
    /// Only requested once a new application version has taken control.
    fn reload(&self);
}

/// A process-wide store that can be reset to its initial state.
///
/// Stores register with [`crate::session::SessionStore::with_teardown`] and
/// are reset when the user signs out, so nothing from the previous user's
/// session survives.
pub trait Teardown: Send + Sync {
    fn teardown(&self);
}

/// Navigator for headless front ends: logs transitions instead of
/// rendering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: &str) {
        tracing::info!(route, "navigate");
    }

    fn reload(&self) {
        tracing::warn!("A new version is active; restart to load it");
    }
}
