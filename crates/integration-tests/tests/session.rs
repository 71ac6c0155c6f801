//! Integration tests for the session store.
//!
//! Covers sign-in, sign-up, sign-out and how the startup state is resolved
//! against auth events arriving in between.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use marketplace_client::baas::AuthEvent;
use marketplace_client::notify::ToastVariant;
use marketplace_client::session::{AuthError, AuthState};
use marketplace_core::Role;
use marketplace_integration_tests::{Harness, MemoryBackend, wait_for_state, wishlist_item};
use secrecy::SecretString;

const EMAIL: &str = "user@test.com";

fn password(value: &str) -> SecretString {
    SecretString::from(value.to_owned())
}

fn backend() -> MemoryBackend {
    MemoryBackend::new().with_account(EMAIL, "correct", &[Role::Customer])
}

async fn signed_in_harness() -> (Harness, marketplace_client::session::AuthSubscription) {
    let mut harness = Harness::new(backend());
    let subscription = harness.session.initialize().await;

    harness
        .session
        .sign_in(EMAIL, &password("correct"))
        .await
        .unwrap();
    wait_for_state(&harness.session, |state| state.user().is_some())
        .await
        .unwrap();
    harness.drain_toasts();

    (harness, subscription)
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_loading_until_initialized() {
    let harness = Harness::new(backend());
    assert!(harness.session.is_loading());
    assert!(harness.session.user().is_none());

    let _subscription = harness.session.initialize().await;
    assert!(!harness.session.is_loading());
    assert!(harness.session.user().is_none());
}

#[tokio::test]
async fn test_existing_session_restored_on_startup() {
    let harness = Harness::new(backend().with_session_for(EMAIL));

    let _subscription = harness.session.initialize().await;

    let user = harness.session.user().unwrap();
    assert_eq!(user.email.as_str(), EMAIL);
    assert!(!harness.session.is_loading());
}

#[tokio::test]
async fn test_event_during_startup_query_applied_after_it() {
    let backend = backend();
    let session = backend.session_for(EMAIL).unwrap();
    backend.emit_during_session_query(AuthEvent::SignedIn(session));
    let harness = Harness::new(backend);

    // The query itself reports no session; the buffered event wins
    let _subscription = harness.session.initialize().await;

    let state = wait_for_state(&harness.session, |state| state.user().is_some())
        .await
        .unwrap();
    assert_eq!(state.user().unwrap().email.as_str(), EMAIL);
}

#[tokio::test]
async fn test_external_events_followed() {
    let (harness, _subscription) = signed_in_harness().await;

    let refreshed = harness.backend.session_for(EMAIL).unwrap();
    harness.backend.publish(AuthEvent::TokenRefreshed(refreshed));
    harness.backend.publish(AuthEvent::SignedOut);

    let state = wait_for_state(&harness.session, |state| state.user().is_none())
        .await
        .unwrap();
    assert!(matches!(state, AuthState::Anonymous));
}

#[tokio::test]
async fn test_unsubscribe_stops_following_events() {
    let harness = Harness::new(backend());
    let subscription = harness.session.initialize().await;
    assert!(subscription.is_active());
    subscription.unsubscribe();

    let session = harness.backend.session_for(EMAIL).unwrap();
    harness.backend.publish(AuthEvent::SignedIn(session));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(harness.session.user().is_none());
}

// =============================================================================
// Sign In
// =============================================================================

#[tokio::test]
async fn test_sign_in_success() {
    let mut harness = Harness::new(backend());
    let _subscription = harness.session.initialize().await;

    harness
        .session
        .sign_in(EMAIL, &password("correct"))
        .await
        .unwrap();

    let state = wait_for_state(&harness.session, |state| state.user().is_some())
        .await
        .unwrap();
    assert_eq!(state.user().unwrap().email.as_str(), EMAIL);
    assert!(!state.is_loading());
    assert!(state.active_session().is_some());
    assert!(harness.drain_toasts().is_empty());
}

#[tokio::test]
async fn test_sign_in_wrong_password() {
    let mut harness = Harness::new(backend());
    let _subscription = harness.session.initialize().await;

    let err = harness
        .session
        .sign_in(EMAIL, &password("wrong"))
        .await
        .unwrap_err();

    assert!(matches!(&err, AuthError::Rejected(message) if message == "Invalid login credentials"));
    assert!(harness.session.user().is_none());
    assert!(!harness.backend.has_session());

    let toasts = harness.drain_toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].title, "Sign-in error");
    assert_eq!(toasts[0].variant, ToastVariant::Destructive);
    assert_eq!(
        toasts[0].description.as_deref(),
        Some("Invalid login credentials")
    );
}

#[tokio::test]
async fn test_failed_sign_in_keeps_existing_user() {
    let (mut harness, _subscription) = signed_in_harness().await;

    let result = harness.session.sign_in(EMAIL, &password("wrong")).await;

    assert!(result.is_err());
    assert_eq!(harness.session.user().unwrap().email.as_str(), EMAIL);
    assert_eq!(harness.drain_toasts()[0].title, "Sign-in error");
}

#[tokio::test]
async fn test_sign_in_invalid_email() {
    let mut harness = Harness::new(backend());
    let _subscription = harness.session.initialize().await;

    let err = harness
        .session
        .sign_in("not-an-email", &password("correct"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidEmail(_)));
    assert_eq!(harness.drain_toasts()[0].title, "Sign-in error");
    assert_eq!(harness.backend.sign_in_attempts(), 0);
}

#[tokio::test]
async fn test_sign_in_trims_address_before_backend() {
    let harness = Harness::new(backend());
    let _subscription = harness.session.initialize().await;

    harness
        .session
        .sign_in("  user@test.com \n", &password("correct"))
        .await
        .unwrap();

    assert_eq!(harness.backend.sign_in_attempts(), 1);
    let state = wait_for_state(&harness.session, |state| state.user().is_some())
        .await
        .unwrap();
    assert_eq!(state.user().unwrap().email.as_str(), EMAIL);
}

// =============================================================================
// Sign Up
// =============================================================================

#[tokio::test]
async fn test_sign_up_creates_account_without_session() {
    let mut harness = Harness::new(backend());
    let _subscription = harness.session.initialize().await;

    harness
        .session
        .sign_up("new@test.com", &password("s3cret-pass"), "New Shopper")
        .await
        .unwrap();

    assert!(harness.backend.is_registered("new@test.com"));
    assert_eq!(harness.backend.sign_up_redirects(), [Harness::REDIRECT]);
    assert!(harness.session.user().is_none());

    let toasts = harness.drain_toasts();
    assert_eq!(toasts[0].title, "Account created");
    assert_eq!(
        toasts[0].description.as_deref(),
        Some("Check your email to confirm your account.")
    );
}

#[tokio::test]
async fn test_sign_up_duplicate_rejected() {
    let mut harness = Harness::new(backend());
    let _subscription = harness.session.initialize().await;

    let err = harness
        .session
        .sign_up(EMAIL, &password("whatever"), "Dup")
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "User already registered");
    let toasts = harness.drain_toasts();
    assert_eq!(toasts[0].title, "Sign-up error");
    assert_eq!(toasts[0].variant, ToastVariant::Destructive);
}

// =============================================================================
// Sign Out
// =============================================================================

#[tokio::test]
async fn test_sign_out_clears_state_immediately() {
    let (mut harness, _subscription) = signed_in_harness().await;

    harness.session.sign_out().await;

    assert!(harness.session.user().is_none());
    assert!(harness.session.snapshot().active_session().is_none());
    assert!(!harness.backend.has_session());
    assert_eq!(harness.navigator.routes(), ["/"]);

    let toasts = harness.drain_toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].title, "Signed out");
    assert_eq!(
        toasts[0].description.as_deref(),
        Some("You have been signed out successfully.")
    );
}

#[tokio::test]
async fn test_sign_out_when_backend_fails() {
    let (mut harness, _subscription) = signed_in_harness().await;
    harness.backend.fail_sign_out();

    harness.session.sign_out().await;

    assert!(harness.session.user().is_none());
    assert_eq!(harness.drain_toasts()[0].title, "Signed out");
    assert_eq!(harness.navigator.routes(), ["/"]);
}

#[tokio::test]
async fn test_sign_out_without_session() {
    let mut harness = Harness::new(backend());
    let _subscription = harness.session.initialize().await;

    harness.session.sign_out().await;

    assert!(matches!(harness.session.snapshot(), AuthState::Anonymous));
    assert_eq!(harness.drain_toasts()[0].title, "Signed out");
}

#[tokio::test]
async fn test_sign_out_tears_down_shopper_state() {
    let (mut harness, _subscription) = signed_in_harness().await;
    harness.wishlist.add(wishlist_item(1, "Lamp", 40));
    harness
        .cart
        .add(marketplace_client::cart::CartLine::from_product(
            &marketplace_integration_tests::product(2, "Rug", 120),
            1,
        ));
    harness.drain_toasts();

    harness.session.sign_out().await;

    assert!(harness.wishlist.is_empty());
    assert!(harness.cart.lines().is_empty());
}
