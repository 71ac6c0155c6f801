//! Types exchanged with the hosted backend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use marketplace_core::{CategoryId, Email, ProductId, StoreId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Auth Types
// ─────────────────────────────────────────────────────────────────────────────

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    /// Profile data attached at sign-up.
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Profile metadata stored alongside the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Credential bundle bound to a [`User`].
///
/// A session always owns its user, so "user present" and "session present"
/// can never disagree.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    /// When the access token stops being accepted.
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Session {
    /// Check if the access token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Utc::now() >= expires_at - chrono::Duration::seconds(60))
    }
}

/// Auth-state change reported by the backend.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// A session was established (this or another client signed in).
    SignedIn(Session),
    /// The session ended (explicit sign-out or revocation).
    SignedOut,
    /// The access token was renewed.
    TokenRefreshed(Session),
    /// Profile data changed.
    UserUpdated(Session),
}

impl AuthEvent {
    /// The session this event leaves in place, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(session) | Self::TokenRefreshed(session) | Self::UserUpdated(session) => {
                Some(session)
            }
            Self::SignedOut => None,
        }
    }
}

/// Account creation request.
#[derive(Debug, Clone)]
pub struct SignUpRequest<'a> {
    pub email: &'a Email,
    pub password: &'a SecretString,
    pub full_name: &'a str,
    /// Where the confirmation email sends the user.
    pub email_redirect_to: &'a str,
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog Types
// ─────────────────────────────────────────────────────────────────────────────

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub is_active: bool,
}

/// A vendor's storefront.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub owner_id: Option<UserId>,
    pub is_active: bool,
}

/// A product listed by a store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub store_id: Option<StoreId>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub stock: i32,
    pub is_active: bool,
}

impl Product {
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Filter for product listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub store_id: Option<StoreId>,
    pub category_id: Option<CategoryId>,
    pub limit: Option<usize>,
}

impl ProductQuery {
    #[must_use]
    pub const fn for_store(store_id: StoreId) -> Self {
        Self {
            store_id: Some(store_id),
            category_id: None,
            limit: None,
        }
    }

    #[must_use]
    pub const fn for_category(category_id: CategoryId) -> Self {
        Self {
            store_id: None,
            category_id: Some(category_id),
            limit: None,
        }
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session_expiring_at(expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            access_token: SecretString::from("access"),
            refresh_token: SecretString::from("refresh"),
            expires_at,
            user: User {
                id: UserId::new(uuid::Uuid::nil()),
                email: Email::parse("user@test.com").unwrap(),
                user_metadata: UserMetadata::default(),
            },
        }
    }

    #[test]
    fn test_session_expiry_buffer() {
        let soon = Utc::now() + chrono::Duration::seconds(30);
        assert!(session_expiring_at(Some(soon)).is_expired());

        let later = Utc::now() + chrono::Duration::hours(1);
        assert!(!session_expiring_at(Some(later)).is_expired());

        assert!(!session_expiring_at(None).is_expired());
    }

    #[test]
    fn test_product_deserialize_numeric_price() {
        let product: Product = serde_json::from_str(
            r#"{"id": 7, "name": "Clay mug", "price": 12.5, "stock": 3, "is_active": true}"#,
        )
        .unwrap();
        assert_eq!(product.id, ProductId::from(7));
        assert_eq!(product.price, Decimal::new(125, 1));
        assert!(product.in_stock());
        assert!(product.store_id.is_none());
    }

    #[test]
    fn test_user_metadata_defaults() {
        let user: User = serde_json::from_str(
            r#"{"id": "7f9c24e8-3b12-4fef-91e0-2b3a4f5c6d7e", "email": "a@b.co"}"#,
        )
        .unwrap();
        assert!(user.user_metadata.full_name.is_none());
    }
}
