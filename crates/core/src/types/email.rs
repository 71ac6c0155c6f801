//! Shopper email addresses.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why an address typed into a sign-in or sign-up form was refused.
///
/// The messages are shown to the shopper as-is.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("enter your email address")]
    Empty,
    #[error("email addresses are limited to {0} characters")]
    TooLong(usize),
    #[error("enter an address like name@example.com")]
    Malformed,
}

/// A form-entered address, checked before it is sent to the auth backend.
///
/// Only the shape `local@domain` is checked; whether the mailbox exists is
/// the backend's business. Addresses deserialized from backend payloads are
/// taken as they are.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// Check and normalize form input.
    ///
    /// ```
    /// use marketplace_core::Email;
    ///
    /// assert_eq!(Email::parse(" vendor@shop.example ").unwrap().as_str(), "vendor@shop.example");
    /// assert!(Email::parse("vendor").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// [`EmailError::Empty`] for blank input, [`EmailError::TooLong`] past
    /// [`Email::MAX_LENGTH`], and [`EmailError::Malformed`] unless the input
    /// is a single `@` between two non-empty halves with no spaces.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let address = input.trim();
        if address.is_empty() {
            return Err(EmailError::Empty);
        }
        if address.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong(Self::MAX_LENGTH));
        }

        let well_formed = address
            .split_once('@')
            .is_some_and(|(mailbox, host)| {
                !mailbox.is_empty() && !host.is_empty() && !host.contains('@')
            })
            && !address.contains(char::is_whitespace);
        if !well_formed {
            return Err(EmailError::Malformed);
        }

        Ok(Self(address.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Log-safe form: first character of the mailbox plus the domain,
    /// e.g. `v***@shop.example`.
    #[must_use]
    pub fn masked(&self) -> String {
        let (mailbox, host) = self.0.split_once('@').unwrap_or((self.0.as_str(), ""));
        let first = mailbox.chars().next().unwrap_or('*');
        format!("{first}***@{host}")
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
