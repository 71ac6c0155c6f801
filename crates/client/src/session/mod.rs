//! Authentication session and role authorization.
//!
//! [`SessionStore`] is the single source of truth for who is signed in and
//! what they may do.
//!
//! # State machine
//!
//! ```text
//!              initialize()
//! Unresolved ──────────────┬──▶ Anonymous ◀──┐
//!                          │        │         │ sign_out() / SignedOut event
//!                          │        ▼         │
//!                          └──▶ Authenticated ┘
//! ```
//!
//! `initialize` awaits the backend's one-shot session query, publishes the
//! result, and only then starts applying auth events. Events that arrive
//! while the query is in flight are buffered and applied afterwards in
//! arrival order, so startup is deterministic and nothing is lost.
//!
//! Sign-in does not write the state directly: the backend publishes a
//! `SignedIn` event and the subscription applies it. Callers that need the
//! user right after `sign_in` returns should wait on [`SessionStore::subscribe`].

mod error;

pub use error::AuthError;

use std::sync::{Arc, Weak};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use marketplace_core::{Email, Role};

use crate::baas::{
    AuthBackend, AuthEvent, BackendError, RoleDirectory, Session, SignUpRequest, User,
};
use crate::lifecycle::{Navigator, Teardown};
use crate::notify::{Notifier, Toast};
use crate::telemetry;

/// Route shown after sign-out.
const HOME_ROUTE: &str = "/";

/// Observable authentication state.
#[derive(Debug, Clone, Default)]
pub enum AuthState {
    /// Startup; the backend has not been asked yet.
    #[default]
    Unresolved,
    /// Nobody is signed in.
    Anonymous,
    /// A user is signed in with a live session.
    Authenticated(Box<Session>),
}

impl AuthState {
    fn from_session(session: Option<Session>) -> Self {
        session.map_or(Self::Anonymous, |s| Self::Authenticated(Box::new(s)))
    }

    /// True only until the first session resolution.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Unresolved)
    }

    #[must_use]
    pub fn active_session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session.as_ref()),
            Self::Unresolved | Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.active_session().map(|session| &session.user)
    }
}

/// Session state plus the operations that change it.
///
/// Construct once, register any stores that must be cleared on sign-out,
/// wrap in an `Arc`, then call [`SessionStore::initialize`].
pub struct SessionStore {
    auth: Arc<dyn AuthBackend>,
    roles: Arc<dyn RoleDirectory>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    email_redirect_to: String,
    state: watch::Sender<AuthState>,
    teardowns: Vec<Arc<dyn Teardown>>,
}

impl SessionStore {
    /// Create a store in the `Unresolved` state.
    ///
    /// `email_redirect_to` is where sign-up confirmation emails send the
    /// user back to.
    pub fn new<B>(
        backend: Arc<B>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        email_redirect_to: impl Into<String>,
    ) -> Self
    where
        B: AuthBackend + RoleDirectory + 'static,
    {
        Self {
            auth: backend.clone(),
            roles: backend,
            notifier,
            navigator,
            email_redirect_to: email_redirect_to.into(),
            state: watch::Sender::new(AuthState::Unresolved),
            teardowns: Vec::new(),
        }
    }

    /// Reset `store` whenever the user signs out.
    #[must_use]
    pub fn with_teardown(mut self, store: Arc<dyn Teardown>) -> Self {
        self.teardowns.push(store);
        self
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    fn current_session(&self) -> Option<Session> {
        self.state.borrow().active_session().cloned()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resolve the startup state and start following auth events.
    ///
    /// A failed session query is logged and resolves to `Anonymous`. The
    /// returned handle stops the event subscription when dropped.
    pub async fn initialize(self: &Arc<Self>) -> AuthSubscription {
        // Subscribe first so events during the query are buffered
        let events = self.auth.subscribe();

        let initial = match self.auth.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Initial session query failed; starting signed out");
                None
            }
        };
        self.apply(AuthState::from_session(initial));

        let handle = tokio::spawn(listen(Arc::downgrade(self), events));
        AuthSubscription { handle }
    }

    fn handle_event(&self, event: &AuthEvent) {
        debug!(event = event_name(event), "Auth state change");
        self.apply(AuthState::from_session(event.session().cloned()));
    }

    fn apply(&self, next: AuthState) {
        match next.user() {
            Some(user) => telemetry::set_sentry_user(user.id, &user.email),
            None => telemetry::clear_sentry_user(),
        }
        self.state.send_replace(next);
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// On failure a "Sign-in error" toast carries the backend's message and
    /// the state is left untouched. On success the state changes once the
    /// backend's `SignedIn` event has been applied.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address,
    /// `AuthError::Rejected` when the backend refuses the credentials, and
    /// `AuthError::Backend` when it cannot be reached.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<(), AuthError> {
        let result = self.try_sign_in(email, password).await;
        if let Err(err) = &result {
            warn!(error = %err, "Sign-in failed");
            self.notifier
                .notify(Toast::destructive("Sign-in error", err.user_message()));
        }
        result
    }

    async fn try_sign_in(&self, email: &str, password: &SecretString) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        debug!(email = %email.masked(), "Signing in");
        self.auth.sign_in_with_password(&email, password).await?;
        telemetry::add_breadcrumb("auth", "Signed in with password");
        Ok(())
    }

    /// Create an account with `full_name` as profile metadata.
    ///
    /// Does not establish a session; the backend may require the user to
    /// confirm their email first.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::sign_in`]; failures show a "Sign-up error"
    /// toast.
    #[instrument(skip_all)]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        full_name: &str,
    ) -> Result<(), AuthError> {
        match self.try_sign_up(email, password, full_name).await {
            Ok(()) => {
                self.notifier.notify(
                    Toast::new("Account created")
                        .with_description("Check your email to confirm your account."),
                );
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Sign-up failed");
                self.notifier
                    .notify(Toast::destructive("Sign-up error", err.user_message()));
                Err(err)
            }
        }
    }

    async fn try_sign_up(
        &self,
        email: &str,
        password: &SecretString,
        full_name: &str,
    ) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        debug!(email = %email.masked(), "Signing up");
        self.auth
            .sign_up(SignUpRequest {
                email: &email,
                password,
                full_name,
                email_redirect_to: &self.email_redirect_to,
            })
            .await?;
        Ok(())
    }

    /// Sign out. Never fails.
    ///
    /// The local session is cleared before the backend is contacted, so the
    /// state is `Anonymous` when this returns whatever the backend says.
    /// Registered stores are then torn down, a confirmation toast is shown
    /// and the navigator is sent home.
    #[instrument(skip_all)]
    pub async fn sign_out(&self) {
        self.apply(AuthState::Anonymous);

        match self.auth.sign_out().await {
            Ok(()) => debug!("Backend session invalidated"),
            Err(BackendError::SessionNotFound) => {
                debug!("No backend session to invalidate");
            }
            Err(e) => warn!(error = %e, "Backend sign-out failed; local session already cleared"),
        }

        for store in &self.teardowns {
            store.teardown();
        }

        telemetry::add_breadcrumb("auth", "Signed out");
        info!("Signed out");
        self.notifier.notify(
            Toast::new("Signed out").with_description("You have been signed out successfully."),
        );
        self.navigator.navigate(HOME_ROUTE);
    }

    // =========================================================================
    // Authorization
    // =========================================================================

    /// The session to authorize a role query with.
    ///
    /// `None` straight away when signed out locally. Otherwise the backend is
    /// asked for its live session, which renews an expired access token. A
    /// renewed token replaces the stored one, and a rejected renewal leaves
    /// the store `Anonymous`.
    async fn authorized_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(stored) = self.current_session() else {
            return Ok(None);
        };

        let live = self.auth.get_session().await?;
        match &live {
            Some(session)
                if session.access_token.expose_secret() != stored.access_token.expose_secret() =>
            {
                debug!("Access token renewed");
                self.apply(AuthState::Authenticated(Box::new(session.clone())));
            }
            Some(_) => {}
            None => {
                info!("Session expired and could not be renewed");
                self.apply(AuthState::Anonymous);
            }
        }
        Ok(live)
    }

    /// Whether the signed-in user holds `role`.
    ///
    /// Returns `Ok(false)` without contacting the backend when nobody is
    /// signed in. Never cached: every call is a fresh query made with the
    /// backend's live session, renewing an expired access token first.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` when the role query itself fails, so a backend
    /// fault is never mistaken for "role not held".
    pub async fn has_role(&self, role: Role) -> Result<bool, BackendError> {
        let Some(session) = self.authorized_session().await? else {
            return Ok(false);
        };
        self.roles.find_role(&session, role).await
    }

    /// One role held by the signed-in user, or `None`.
    ///
    /// Users can hold several roles; this returns whichever row the backend
    /// yields first. Use [`SessionStore::user_roles`] for the full set.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` when the role query fails.
    pub async fn get_user_role(&self) -> Result<Option<Role>, BackendError> {
        let Some(session) = self.authorized_session().await? else {
            return Ok(None);
        };
        self.roles.first_role(&session).await
    }

    /// Every role held by the signed-in user (empty when signed out).
    ///
    /// # Errors
    ///
    /// Returns `BackendError` when the role query fails.
    pub async fn user_roles(&self) -> Result<Vec<Role>, BackendError> {
        let Some(session) = self.authorized_session().await? else {
            return Ok(Vec::new());
        };
        self.roles.roles(&session).await
    }
}

async fn listen(store: Weak<SessionStore>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        let event = events.recv().await;
        let Some(store) = store.upgrade() else {
            break;
        };

        match event {
            Ok(event) => store.handle_event(&event),
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Auth events dropped; re-querying session");
                match store.auth.get_session().await {
                    Ok(session) => store.apply(AuthState::from_session(session)),
                    Err(e) => warn!(error = %e, "Session re-query failed"),
                }
            }
            Err(RecvError::Closed) => {
                debug!("Auth event stream closed");
                break;
            }
        }
    }
}

const fn event_name(event: &AuthEvent) -> &'static str {
    match event {
        AuthEvent::SignedIn(_) => "signed_in",
        AuthEvent::SignedOut => "signed_out",
        AuthEvent::TokenRefreshed(_) => "token_refreshed",
        AuthEvent::UserUpdated(_) => "user_updated",
    }
}

/// Handle to the auth-event subscription started by
/// [`SessionStore::initialize`]. Dropping it unsubscribes.
#[must_use = "dropping the subscription stops auth-state updates"]
#[derive(Debug)]
pub struct AuthSubscription {
    handle: JoinHandle<()>,
}

impl AuthSubscription {
    /// Stop applying auth events.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether events are still being applied.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
