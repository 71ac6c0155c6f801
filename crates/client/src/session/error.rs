//! Authentication error types.

use thiserror::Error;

use crate::baas::BackendError;

/// Errors returned by sign-in and sign-up.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] marketplace_core::EmailError),

    /// The backend refused the credentials or the request (wrong password,
    /// duplicate account, weak password). Carries the backend's message.
    #[error("{0}")]
    Rejected(String),

    /// The backend could not be reached or answered unexpectedly.
    #[error("backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        if err.is_rejection() {
            Self::Rejected(err.user_message())
        } else {
            Self::Backend(err)
        }
    }
}

impl AuthError {
    /// Description shown to the user alongside the error title.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidEmail(err) => err.to_string(),
            Self::Rejected(message) => message.clone(),
            Self::Backend(err) => err.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_keeps_backend_message() {
        let err = AuthError::from(BackendError::Api {
            status: 422,
            code: Some("user_already_exists".to_string()),
            message: "User already registered".to_string(),
        });
        assert!(matches!(err, AuthError::Rejected(_)));
        assert_eq!(err.user_message(), "User already registered");
        assert_eq!(err.to_string(), "User already registered");
    }

    #[test]
    fn test_transport_failures_stay_backend_errors() {
        let err = AuthError::from(BackendError::RateLimited(30));
        assert!(matches!(err, AuthError::Backend(_)));
    }

    #[test]
    fn test_invalid_email_message() {
        let err = AuthError::from(marketplace_core::EmailError::Malformed);
        assert_eq!(err.user_message(), "enter an address like name@example.com");
    }
}
