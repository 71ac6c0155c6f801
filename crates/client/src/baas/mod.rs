//! Hosted backend (BaaS) access.
//!
//! # Architecture
//!
//! - The backend owns persistence, authentication and authorization; the
//!   client never caches role data
//! - Capabilities are split into traits so stores can be tested against an
//!   in-memory backend:
//!   - [`AuthBackend`] - password sign-in/up/out, session query, auth events
//!   - [`RoleDirectory`] - rows of the `user_roles` table
//!   - [`CatalogSource`] - active categories, stores and products
//! - [`RestBackend`] implements all three over the backend's REST API
//!
//! # Example
//!
//! ```rust,ignore
//! use marketplace_client::baas::RestBackend;
//!
//! let backend = RestBackend::new(&config.baas);
//! let mut events = backend.subscribe();
//!
//! backend.sign_in_with_password(&email, &password).await?;
//! // AuthEvent::SignedIn(session) arrives on `events`
//! ```

mod rest;
pub mod types;

pub use rest::RestBackend;
pub use types::*;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::broadcast;

use marketplace_core::{Email, ProductId, Role};

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error code, when the backend sends one.
        code: Option<String>,
        /// Human-readable message, passed through verbatim.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The backend has no session to act on.
    #[error("Auth session missing")]
    SessionNotFound,

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// Message suitable for showing to the user.
    ///
    /// API errors carry the backend's own wording; everything else falls back
    /// to the error's display form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the backend rejected the request itself (bad credentials,
    /// duplicate account, validation) rather than failing to answer.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 400 && *status < 500)
    }
}

/// Password authentication and session lifecycle.
///
/// Successful calls do not return the session; it is published as an
/// [`AuthEvent`] to every receiver from [`AuthBackend::subscribe`].
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Verify credentials and establish a session.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<(), BackendError>;

    /// Create an account. Depending on project policy the account may need
    /// email confirmation before a session exists.
    async fn sign_up(&self, request: SignUpRequest<'_>) -> Result<(), BackendError>;

    /// Invalidate the current session.
    ///
    /// Returns [`BackendError::SessionNotFound`] when there was nothing to
    /// invalidate.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// One-shot query for the current session.
    ///
    /// An expired session is renewed first and published as
    /// [`AuthEvent::TokenRefreshed`]. If the backend rejects the renewal the
    /// session is dropped, [`AuthEvent::SignedOut`] is published and the
    /// result is `Ok(None)`.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Continuous stream of auth-state changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Point queries against the `user_roles` table.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Whether a `(user_id, role)` row exists for the session's user.
    async fn find_role(&self, session: &Session, role: Role) -> Result<bool, BackendError>;

    /// The first role row found for the session's user.
    async fn first_role(&self, session: &Session) -> Result<Option<Role>, BackendError>;

    /// Every role held by the session's user.
    async fn roles(&self, session: &Session) -> Result<Vec<Role>, BackendError>;
}

/// Read access to the active catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn active_categories(&self) -> Result<Vec<Category>, BackendError>;

    async fn active_stores(&self) -> Result<Vec<Store>, BackendError>;

    async fn active_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BackendError>;

    async fn product(&self, id: &ProductId) -> Result<Option<Product>, BackendError>;
}
