//! Sentry scope helpers.
//!
//! These are no-ops unless the binary initialised Sentry.

use marketplace_core::{Email, UserId};

/// Associate subsequent Sentry events with the signed-in user.
pub fn set_sentry_user(user_id: UserId, email: &Email) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }));
    });
}

/// Stop associating Sentry events with a user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Record a user action as a breadcrumb for later error reports.
pub fn add_breadcrumb(category: &str, message: &str) {
    sentry::add_breadcrumb(sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    });
}
