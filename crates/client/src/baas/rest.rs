//! REST implementation of the backend traits.
//!
//! Auth calls go to `/auth/v1`, table reads to `/rest/v1/{table}` with
//! PostgREST-style filters (`column=eq.value`). Every request carries the
//! project's anon key in the `apikey` header; table reads made on behalf of
//! a user send that user's access token as the bearer so row-level policies
//! apply.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, instrument};
use url::Url;

use marketplace_core::{Email, ProductId, Role};

use super::{
    AuthBackend, AuthEvent, BackendError, CatalogSource, Category, Product, ProductQuery,
    RoleDirectory, Session, SignUpRequest, Store, User, UserMetadata,
};
use crate::config::{BaasConfig, with_trailing_slash};

/// Buffered auth events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: UserMetadata,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });

        Session {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up answers with a session when confirmation is disabled, or with
/// the bare user when confirmation is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Box<TokenResponse>),
    Pending(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    role: Role,
}

/// Error body shapes used by the auth and table endpoints.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

fn api_error(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    let code = parsed
        .error_code
        .or_else(|| parsed.code.as_ref().and_then(|c| c.as_str()).map(str::to_owned))
        .or_else(|| parsed.error.clone());

    if code.as_deref() == Some("session_not_found") {
        return BackendError::SessionNotFound;
    }

    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| format!("HTTP {status}"));

    BackendError::Api {
        status,
        code,
        message,
    }
}

fn truncated(body: &str) -> String {
    body.chars().take(500).collect()
}

// =============================================================================
// RestBackend
// =============================================================================

/// Client for the hosted backend's REST API.
///
/// Holds the current session in memory and broadcasts an [`AuthEvent`] for
/// every change to it. Cheaply cloneable; clones share the session.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<RestBackendInner>,
}

struct RestBackendInner {
    client: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl RestBackend {
    /// Create a new backend client.
    #[must_use]
    pub fn new(config: &BaasConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(RestBackendInner {
                client: reqwest::Client::new(),
                base_url: with_trailing_slash(config.url.clone()),
                anon_key: config.anon_key.clone(),
                session: RwLock::new(None),
                events,
            }),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.base_url.join(path)?)
    }

    /// Build a request authorised as `bearer`, or anonymously.
    fn request(&self, method: Method, url: Url, bearer: Option<&SecretString>) -> RequestBuilder {
        let token = bearer.unwrap_or(&self.inner.anon_key);
        self.inner
            .client
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(token.expose_secret())
    }

    /// Send a request and return the body of a successful response.
    async fn send_raw(request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if !status.is_success() {
            debug!(
                status = %status,
                body = %truncated(&body),
                "Backend returned non-success status"
            );
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(body)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, BackendError> {
        let body = Self::send_raw(request).await?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncated(&body),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Read rows from a table with `(column, filter)` query pairs.
    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        bearer: Option<&SecretString>,
    ) -> Result<Vec<T>, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filters {
                pairs.append_pair(key, value);
            }
        }

        Self::send(self.request(Method::GET, url, bearer)).await
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is not an error
        let _ = self.inner.events.send(event);
    }

    async fn store_session(&self, session: Session) {
        *self.inner.session.write().await = Some(session);
    }

    async fn current_session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }

    /// Exchange the stored refresh token for a new session.
    #[instrument(skip(self))]
    async fn refresh_session(&self) -> Result<(), BackendError> {
        let Some(current) = self.current_session().await else {
            return Err(BackendError::SessionNotFound);
        };

        let grant = RefreshGrant {
            refresh_token: current.refresh_token.expose_secret(),
        };
        let session = self.token_request("refresh_token", &grant).await?;

        self.store_session(session.clone()).await;
        self.publish(AuthEvent::TokenRefreshed(session));
        Ok(())
    }

    async fn token_request<B: Serialize + Sync>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let token: TokenResponse =
            Self::send(self.request(Method::POST, url, None).json(body)).await?;
        Ok(token.into_session())
    }
}

#[async_trait]
impl AuthBackend for RestBackend {
    #[instrument(skip(self, password), fields(email = %email.masked()))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<(), BackendError> {
        let grant = PasswordGrant {
            email: email.as_str(),
            password: password.expose_secret(),
        };
        let session = self.token_request("password", &grant).await?;

        debug!(user_id = %session.user.id, "Password sign-in accepted");
        self.store_session(session.clone()).await;
        self.publish(AuthEvent::SignedIn(session));
        Ok(())
    }

    #[instrument(skip(self, request), fields(email = %request.email.masked()))]
    async fn sign_up(&self, request: SignUpRequest<'_>) -> Result<(), BackendError> {
        let mut url = self.endpoint("auth/v1/signup")?;
        url.query_pairs_mut()
            .append_pair("redirect_to", request.email_redirect_to);

        let body = SignUpBody {
            email: request.email.as_str(),
            password: request.password.expose_secret(),
            data: UserMetadata {
                full_name: Some(request.full_name.to_owned()),
            },
        };

        let response: SignUpResponse =
            Self::send(self.request(Method::POST, url, None).json(&body)).await?;

        match response {
            SignUpResponse::Session(token) => {
                let session = token.into_session();
                debug!(user_id = %session.user.id, "Sign-up returned a session");
                self.store_session(session.clone()).await;
                self.publish(AuthEvent::SignedIn(session));
            }
            SignUpResponse::Pending(_) => debug!("Sign-up awaiting email confirmation"),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.inner.session.write().await.take() else {
            return Err(BackendError::SessionNotFound);
        };
        self.publish(AuthEvent::SignedOut);

        let url = self.endpoint("auth/v1/logout")?;
        match Self::send_raw(self.request(Method::POST, url, Some(&session.access_token))).await {
            Ok(_) => Ok(()),
            // The token was already revoked or expired server-side
            Err(BackendError::Api {
                status: 401 | 403 | 404,
                ..
            }) => Err(BackendError::SessionNotFound),
            Err(e) => Err(e),
        }
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        debug!("Stored session expired; refreshing");
        match self.refresh_session().await {
            Ok(()) => Ok(self.current_session().await),
            Err(e) if e.is_rejection() || matches!(e, BackendError::SessionNotFound) => {
                debug!(error = %e, "Refresh rejected; dropping session");
                if self.inner.session.write().await.take().is_some() {
                    self.publish(AuthEvent::SignedOut);
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

#[async_trait]
impl RoleDirectory for RestBackend {
    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn find_role(&self, session: &Session, role: Role) -> Result<bool, BackendError> {
        let rows: Vec<RoleRow> = self
            .select(
                "user_roles",
                &[
                    ("select", "role".to_string()),
                    ("user_id", format!("eq.{}", session.user.id)),
                    ("role", format!("eq.{role}")),
                    ("limit", "1".to_string()),
                ],
                Some(&session.access_token),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn first_role(&self, session: &Session) -> Result<Option<Role>, BackendError> {
        let rows: Vec<RoleRow> = self
            .select(
                "user_roles",
                &[
                    ("select", "role".to_string()),
                    ("user_id", format!("eq.{}", session.user.id)),
                    ("limit", "1".to_string()),
                ],
                Some(&session.access_token),
            )
            .await?;
        Ok(rows.into_iter().next().map(|row| row.role))
    }

    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn roles(&self, session: &Session) -> Result<Vec<Role>, BackendError> {
        let rows: Vec<RoleRow> = self
            .select(
                "user_roles",
                &[
                    ("select", "role".to_string()),
                    ("user_id", format!("eq.{}", session.user.id)),
                ],
                Some(&session.access_token),
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.role).collect())
    }
}

#[async_trait]
impl CatalogSource for RestBackend {
    async fn active_categories(&self) -> Result<Vec<Category>, BackendError> {
        self.select("categories", &active_by_name(), None).await
    }

    async fn active_stores(&self) -> Result<Vec<Store>, BackendError> {
        self.select("stores", &active_by_name(), None).await
    }

    #[instrument(skip(self))]
    async fn active_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BackendError> {
        let mut filters = active_by_name();
        if let Some(store_id) = query.store_id {
            filters.push(("store_id", format!("eq.{store_id}")));
        }
        if let Some(category_id) = query.category_id {
            filters.push(("category_id", format!("eq.{category_id}")));
        }
        if let Some(limit) = query.limit {
            filters.push(("limit", limit.to_string()));
        }
        self.select("products", &filters, None).await
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn product(&self, id: &ProductId) -> Result<Option<Product>, BackendError> {
        let rows: Vec<Product> = self
            .select(
                "products",
                &[
                    ("select", "*".to_string()),
                    ("id", format!("eq.{id}")),
                    ("is_active", "eq.true".to_string()),
                    ("limit", "1".to_string()),
                ],
                None,
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

fn active_by_name() -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".to_string()),
        ("is_active", "eq.true".to_string()),
        ("order", "name.asc".to_string()),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_auth_shape() {
        let err = api_error(
            400,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        match err {
            BackendError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("invalid_credentials"));
                assert_eq!(message, "Invalid login credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_oauth_shape() {
        let err = api_error(
            400,
            r#"{"error":"invalid_grant","error_description":"Email not confirmed"}"#,
        );
        assert_eq!(err.user_message(), "Email not confirmed");
    }

    #[test]
    fn test_api_error_table_shape() {
        let err = api_error(
            401,
            r#"{"code":"PGRST301","message":"JWT expired","details":null,"hint":null}"#,
        );
        match err {
            BackendError::Api { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("PGRST301"));
                assert_eq!(message, "JWT expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_session_not_found() {
        let err = api_error(
            403,
            r#"{"code":403,"error_code":"session_not_found","msg":"Session from session_id claim in JWT does not exist"}"#,
        );
        assert!(matches!(err, BackendError::SessionNotFound));
    }

    #[test]
    fn test_api_error_unparseable_body() {
        let err = api_error(502, "<html>Bad Gateway</html>");
        assert_eq!(err.user_message(), "HTTP 502");
    }

    #[test]
    fn test_token_response_prefers_absolute_expiry() {
        let token: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "a",
                "refresh_token": "r",
                "expires_in": 3600,
                "expires_at": 1893456000,
                "token_type": "bearer",
                "user": {"id": "7f9c24e8-3b12-4fef-91e0-2b3a4f5c6d7e", "email": "user@test.com"}
            }"#,
        )
        .unwrap();
        let session = token.into_session();
        assert_eq!(session.expires_at.unwrap().timestamp(), 1_893_456_000);
        assert_eq!(session.user.email.as_str(), "user@test.com");
    }

    #[test]
    fn test_sign_up_response_pending() {
        let response: SignUpResponse = serde_json::from_str(
            r#"{"id": "7f9c24e8-3b12-4fef-91e0-2b3a4f5c6d7e", "email": "new@test.com", "confirmation_sent_at": "2026-10-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(response, SignUpResponse::Pending(_)));
    }

    #[tokio::test]
    async fn test_sign_out_without_session() {
        let backend = RestBackend::new(&BaasConfig {
            url: Url::parse("http://127.0.0.1:9/").unwrap(),
            anon_key: SecretString::from("anon"),
        });
        let err = backend.sign_out().await.unwrap_err();
        assert!(matches!(err, BackendError::SessionNotFound));
    }

    #[tokio::test]
    async fn test_get_session_empty() {
        let backend = RestBackend::new(&BaasConfig {
            url: Url::parse("http://127.0.0.1:9/project").unwrap(),
            anon_key: SecretString::from("anon"),
        });
        assert!(backend.get_session().await.unwrap().is_none());
        assert_eq!(
            backend.endpoint("auth/v1/token").unwrap().as_str(),
            "http://127.0.0.1:9/project/auth/v1/token"
        );
    }

    fn stored_session(expires_at: i64) -> Session {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_at": expires_at,
            "user": {"id": "7f9c24e8-3b12-4fef-91e0-2b3a4f5c6d7e", "email": "user@test.com"}
        }))
        .unwrap();
        token.into_session()
    }

    #[tokio::test]
    async fn test_get_session_live_token_skips_refresh() {
        let backend = RestBackend::new(&BaasConfig {
            url: Url::parse("http://127.0.0.1:9/").unwrap(),
            anon_key: SecretString::from("anon"),
        });
        let mut events = backend.subscribe();
        backend.store_session(stored_session(4_102_444_800)).await;

        let session = backend.get_session().await.unwrap().unwrap();
        assert_eq!(session.access_token.expose_secret(), "a");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_get_session_unreachable_refresh_keeps_session() {
        let backend = RestBackend::new(&BaasConfig {
            url: Url::parse("http://127.0.0.1:9/").unwrap(),
            anon_key: SecretString::from("anon"),
        });
        let mut events = backend.subscribe();
        backend.store_session(stored_session(1_000_000_000)).await;

        // Transport failures are not rejections
        let err = backend.get_session().await.unwrap_err();
        assert!(matches!(err, BackendError::Http(_)));
        assert!(backend.current_session().await.is_some());
        assert!(events.try_recv().is_err());
    }
}
