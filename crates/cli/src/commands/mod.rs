//! Command implementations.
//!
//! Each command builds what it needs from the shared [`App`] and reports
//! results through `tracing` rather than printing.

pub mod auth;
pub mod catalog;
pub mod updates;

use std::sync::Arc;

use marketplace_client::baas::{BackendError, RestBackend};
use marketplace_client::config::{ConfigError, MarketplaceConfig};
use marketplace_client::lifecycle::TracingNavigator;
use marketplace_client::notify::TracingNotifier;
use marketplace_client::session::{AuthError, SessionStore};
use marketplace_client::update::UpdateError;
use marketplace_core::RoleParseError;
use secrecy::SecretString;
use thiserror::Error;

const PASSWORD_ENV: &str = "MARKETPLACE_PASSWORD";

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sign-in or sign-up failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A backend request failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The update worker could not be created.
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Unknown role name.
    #[error(transparent)]
    InvalidRole(#[from] RoleParseError),

    /// No password on the command line or in the environment.
    #[error("Missing password: pass --password or set {PASSWORD_ENV}")]
    MissingPassword,

    /// The backend accepted the sign-in but no session arrived in time.
    #[error("Timed out waiting for the session to become active")]
    SessionTimeout,
}

/// Shared command context.
pub struct App {
    pub config: MarketplaceConfig,
    pub backend: Arc<RestBackend>,
}

impl App {
    pub fn new(config: MarketplaceConfig) -> Self {
        let backend = Arc::new(RestBackend::new(&config.baas));
        Self { config, backend }
    }

    /// A fresh, uninitialized session store over the shared backend.
    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(
            self.backend.clone(),
            Arc::new(TracingNotifier),
            Arc::new(TracingNavigator),
            self.config.site_url.as_str(),
        )
    }
}

/// Resolve the password from the flag or the environment.
pub fn password(flag: Option<String>) -> Result<SecretString, CliError> {
    flag.or_else(|| std::env::var(PASSWORD_ENV).ok())
        .filter(|password| !password.is_empty())
        .map(SecretString::from)
        .ok_or(CliError::MissingPassword)
}
