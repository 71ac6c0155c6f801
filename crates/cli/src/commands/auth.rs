//! Authentication commands.
//!
//! # Usage
//!
//! ```bash
//! mp-cli sign-in -e shopper@example.com -p ...
//! mp-cli sign-up -e shopper@example.com -n "Sam Shopper" -p ...
//! mp-cli role -e vendor@example.com -p ... -r vendor
//! ```

use std::sync::Arc;
use std::time::Duration;

use marketplace_client::baas::User;
use marketplace_client::session::{AuthSubscription, SessionStore};
use marketplace_core::Role;
use secrecy::SecretString;

use super::{App, CliError};

/// How long to wait for the backend's sign-in event.
const SESSION_WAIT: Duration = Duration::from_secs(10);

/// A signed-in session kept alive for the duration of a command.
struct SignedIn {
    store: Arc<SessionStore>,
    _subscription: AuthSubscription,
    user: User,
}

async fn sign_in_session(
    app: &App,
    email: &str,
    password: &SecretString,
) -> Result<SignedIn, CliError> {
    let store = Arc::new(app.session_store());
    let subscription = store.initialize().await;

    store.sign_in(email, password).await?;

    let mut states = store.subscribe();
    let user = tokio::time::timeout(SESSION_WAIT, async {
        states
            .wait_for(|state| state.user().is_some())
            .await
            .map(|state| state.user().cloned())
    })
    .await
    .ok()
    .and_then(Result::ok)
    .flatten()
    .ok_or(CliError::SessionTimeout)?;

    Ok(SignedIn {
        store,
        _subscription: subscription,
        user,
    })
}

/// Sign in, report identity and roles, then sign out.
pub async fn sign_in(app: &App, email: &str, password: &SecretString) -> Result<(), CliError> {
    let signed_in = sign_in_session(app, email, password).await?;
    let user = &signed_in.user;

    tracing::info!(
        user_id = %user.id,
        email = %user.email,
        full_name = user.user_metadata.full_name.as_deref().unwrap_or("-"),
        "Signed in"
    );

    let result = report_roles(&signed_in.store).await;
    signed_in.store.sign_out().await;
    result
}

async fn report_roles(store: &SessionStore) -> Result<(), CliError> {
    match store.get_user_role().await? {
        Some(role) => tracing::info!(%role, "Primary role"),
        None => tracing::info!("No role assigned"),
    }

    let roles = store.user_roles().await?;
    let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
    tracing::info!(roles = %names.join(", "), "All roles");
    Ok(())
}

/// Create an account.
pub async fn sign_up(
    app: &App,
    email: &str,
    password: &SecretString,
    full_name: &str,
) -> Result<(), CliError> {
    let store = app.session_store();
    store.sign_up(email, password, full_name).await?;
    tracing::info!(email, "Account created; confirmation email sent");
    Ok(())
}

/// Sign in and check a single role.
pub async fn check_role(
    app: &App,
    email: &str,
    password: &SecretString,
    role: &str,
) -> Result<(), CliError> {
    let role: Role = role.parse()?;
    let signed_in = sign_in_session(app, email, password).await?;

    let result = signed_in.store.has_role(role).await;
    signed_in.store.sign_out().await;

    let held = result?;
    tracing::info!(email = %signed_in.user.email, %role, held, "Role check");
    Ok(())
}
