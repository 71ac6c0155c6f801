//! Integration tests for the marketplace client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marketplace-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session` - Sign-in, sign-up, sign-out and startup resolution
//! - `roles` - Role checks against the role directory
//! - `wishlist` / `cart` - Shopper collections and sign-out teardown
//! - `catalog` - Cached catalog reads
//! - `updates` - Update detection and activation
//!
//! Everything runs against [`MemoryBackend`], an in-process stand-in for
//! the hosted backend that records how it was called.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, mpsc};

use marketplace_client::baas::{
    AuthBackend, AuthEvent, BackendError, CatalogSource, Category, Product, ProductQuery,
    RoleDirectory, Session, SignUpRequest, Store, User, UserMetadata,
};
use marketplace_client::cart::CartStore;
use marketplace_client::lifecycle::Navigator;
use marketplace_client::notify::{ChannelNotifier, Toast};
use marketplace_client::session::{AuthState, SessionStore};
use marketplace_client::update::{UpdateError, UpdateWorker, WorkerEvent};
use marketplace_client::wishlist::{WishlistItem, WishlistStore};
use marketplace_core::{CategoryId, Email, ProductId, Role, StoreId, UserId};

/// How long tests wait for an asynchronous state change.
pub const STATE_WAIT: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Memory Backend
// =============================================================================

struct Account {
    user: User,
    password: String,
    roles: Vec<Role>,
}

/// In-memory backend implementing auth, roles and catalog reads.
pub struct MemoryBackend {
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    catalog: Mutex<Catalog>,
    /// Event published while the startup session query is in flight.
    event_during_query: Mutex<Option<AuthEvent>>,
    sign_up_redirects: Mutex<Vec<String>>,
    fail_sign_out: AtomicBool,
    fail_roles: AtomicBool,
    reject_refresh: AtomicBool,
    sign_in_attempts: AtomicUsize,
    refreshes: AtomicUsize,
    role_queries: AtomicUsize,
    catalog_queries: AtomicUsize,
}

#[derive(Default)]
struct Catalog {
    categories: Vec<Category>,
    stores: Vec<Store>,
    products: Vec<Product>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            events,
            catalog: Mutex::new(Catalog::default()),
            event_during_query: Mutex::new(None),
            sign_up_redirects: Mutex::new(Vec::new()),
            fail_sign_out: AtomicBool::new(false),
            fail_roles: AtomicBool::new(false),
            reject_refresh: AtomicBool::new(false),
            sign_in_attempts: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            role_queries: AtomicUsize::new(0),
            catalog_queries: AtomicUsize::new(0),
        }
    }

    /// Register an account.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid address.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn with_account(self, email: &str, password: &str, roles: &[Role]) -> Self {
        let user = User {
            id: UserId::new(uuid::Uuid::new_v4()),
            email: Email::parse(email).unwrap(),
            user_metadata: UserMetadata::default(),
        };
        lock(&self.accounts).insert(
            user.email.as_str().to_owned(),
            Account {
                user,
                password: password.to_owned(),
                roles: roles.to_vec(),
            },
        );
        self
    }

    /// Start with `email` already signed in.
    #[must_use]
    pub fn with_session_for(self, email: &str) -> Self {
        let session = self.session_for(email);
        *lock(&self.session) = session;
        self
    }

    #[must_use]
    pub fn with_products(self, products: Vec<Product>) -> Self {
        lock(&self.catalog).products = products;
        self
    }

    #[must_use]
    pub fn with_categories(self, categories: Vec<Category>) -> Self {
        lock(&self.catalog).categories = categories;
        self
    }

    #[must_use]
    pub fn with_stores(self, stores: Vec<Store>) -> Self {
        lock(&self.catalog).stores = stores;
        self
    }

    /// Publish `event` while the next `get_session` call is in flight.
    pub fn emit_during_session_query(&self, event: AuthEvent) {
        *lock(&self.event_during_query) = Some(event);
    }

    /// Make backend sign-out fail with a server error.
    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    /// Make role queries fail with a server error.
    pub fn fail_roles(&self) {
        self.fail_roles.store(true, Ordering::SeqCst);
    }

    /// Refuse token renewal, as for a revoked refresh token.
    pub fn reject_refresh(&self) {
        self.reject_refresh.store(true, Ordering::SeqCst);
    }

    /// Move the current session's expiry into the past.
    pub fn expire_session(&self) {
        if let Some(session) = lock(&self.session).as_mut() {
            session.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        }
    }

    /// Publish an auth event as if another client caused it.
    pub fn publish(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    /// A session for a registered account.
    #[must_use]
    pub fn session_for(&self, email: &str) -> Option<Session> {
        lock(&self.accounts).get(email).map(|account| Session {
            access_token: SecretString::from(format!("access-{}", account.user.id)),
            refresh_token: SecretString::from(format!("refresh-{}", account.user.id)),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            user: account.user.clone(),
        })
    }

    #[must_use]
    pub fn has_session(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// The access token the backend currently accepts.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.access_token.expose_secret().to_owned())
    }

    #[must_use]
    pub fn sign_in_attempts(&self) -> usize {
        self.sign_in_attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn role_queries(&self) -> usize {
        self.role_queries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn catalog_queries(&self) -> usize {
        self.catalog_queries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_up_redirects(&self) -> Vec<String> {
        lock(&self.sign_up_redirects).clone()
    }

    #[must_use]
    pub fn is_registered(&self, email: &str) -> bool {
        lock(&self.accounts).contains_key(email)
    }

    fn server_error(message: &str) -> BackendError {
        BackendError::Api {
            status: 500,
            code: None,
            message: message.to_owned(),
        }
    }

    fn role_query(&self, session: &Session) -> Result<(), BackendError> {
        self.role_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_roles.load(Ordering::SeqCst) {
            return Err(Self::server_error("permission denied for table user_roles"));
        }

        let accepted = lock(&self.session).as_ref().is_some_and(|current| {
            !current.is_expired()
                && current.access_token.expose_secret() == session.access_token.expose_secret()
        });
        if !accepted {
            return Err(BackendError::Api {
                status: 401,
                code: Some("PGRST301".to_owned()),
                message: "JWT expired".to_owned(),
            });
        }
        Ok(())
    }

    /// Renew the stored session, or drop it when renewal is refused.
    fn refresh(&self) -> Option<Session> {
        let generation = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_refresh.load(Ordering::SeqCst) {
            lock(&self.session).take();
            self.publish(AuthEvent::SignedOut);
            return None;
        }

        let renewed = {
            let mut stored = lock(&self.session);
            let session = stored.as_mut()?;
            session.access_token =
                SecretString::from(format!("access-{}-{generation}", session.user.id));
            session.expires_at = Some(Utc::now() + chrono::Duration::hours(1));
            session.clone()
        };
        self.publish(AuthEvent::TokenRefreshed(renewed.clone()));
        Some(renewed)
    }

    fn roles_for(&self, session: &Session) -> Vec<Role> {
        lock(&self.accounts)
            .values()
            .find(|account| account.user.id == session.user.id)
            .map(|account| account.roles.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<(), BackendError> {
        self.sign_in_attempts.fetch_add(1, Ordering::SeqCst);
        let accepted = lock(&self.accounts)
            .get(email.as_str())
            .is_some_and(|account| account.password == password.expose_secret());
        if !accepted {
            return Err(BackendError::Api {
                status: 400,
                code: Some("invalid_credentials".to_owned()),
                message: "Invalid login credentials".to_owned(),
            });
        }

        let session = self.session_for(email.as_str());
        lock(&self.session).clone_from(&session);
        if let Some(session) = session {
            self.publish(AuthEvent::SignedIn(session));
        }
        Ok(())
    }

    async fn sign_up(&self, request: SignUpRequest<'_>) -> Result<(), BackendError> {
        let mut accounts = lock(&self.accounts);
        if accounts.contains_key(request.email.as_str()) {
            return Err(BackendError::Api {
                status: 422,
                code: Some("user_already_exists".to_owned()),
                message: "User already registered".to_owned(),
            });
        }

        accounts.insert(
            request.email.as_str().to_owned(),
            Account {
                user: User {
                    id: UserId::new(uuid::Uuid::new_v4()),
                    email: request.email.clone(),
                    user_metadata: UserMetadata {
                        full_name: Some(request.full_name.to_owned()),
                    },
                },
                password: request.password.expose_secret().to_owned(),
                roles: Vec::new(),
            },
        );
        lock(&self.sign_up_redirects).push(request.email_redirect_to.to_owned());
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(Self::server_error("upstream unavailable"));
        }
        if lock(&self.session).take().is_none() {
            return Err(BackendError::SessionNotFound);
        }
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let session = lock(&self.session).clone();
        if let Some(event) = lock(&self.event_during_query).take() {
            self.publish(event);
        }
        match session {
            Some(session) if session.is_expired() => Ok(self.refresh()),
            other => Ok(other),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl RoleDirectory for MemoryBackend {
    async fn find_role(&self, session: &Session, role: Role) -> Result<bool, BackendError> {
        self.role_query(session)?;
        Ok(self.roles_for(session).contains(&role))
    }

    async fn first_role(&self, session: &Session) -> Result<Option<Role>, BackendError> {
        self.role_query(session)?;
        Ok(self.roles_for(session).first().copied())
    }

    async fn roles(&self, session: &Session) -> Result<Vec<Role>, BackendError> {
        self.role_query(session)?;
        Ok(self.roles_for(session))
    }
}

#[async_trait]
impl CatalogSource for MemoryBackend {
    async fn active_categories(&self) -> Result<Vec<Category>, BackendError> {
        self.catalog_queries.fetch_add(1, Ordering::SeqCst);
        let catalog = lock(&self.catalog);
        Ok(catalog
            .categories
            .iter()
            .filter(|category| category.is_active)
            .cloned()
            .collect())
    }

    async fn active_stores(&self) -> Result<Vec<Store>, BackendError> {
        self.catalog_queries.fetch_add(1, Ordering::SeqCst);
        let catalog = lock(&self.catalog);
        Ok(catalog
            .stores
            .iter()
            .filter(|store| store.is_active)
            .cloned()
            .collect())
    }

    async fn active_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BackendError> {
        self.catalog_queries.fetch_add(1, Ordering::SeqCst);
        let catalog = lock(&self.catalog);
        let matching = catalog.products.iter().filter(|product| {
            product.is_active
                && query.store_id.is_none_or(|id| product.store_id == Some(id))
                && query
                    .category_id
                    .is_none_or(|id| product.category_id == Some(id))
        });
        Ok(matching
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn product(&self, id: &ProductId) -> Result<Option<Product>, BackendError> {
        self.catalog_queries.fetch_add(1, Ordering::SeqCst);
        let catalog = lock(&self.catalog);
        Ok(catalog
            .products
            .iter()
            .find(|product| &product.id == id && product.is_active)
            .cloned())
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Navigator that records what it was asked to do.
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
    reloads: AtomicUsize,
}

impl RecordingNavigator {
    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        lock(&self.routes).clone()
    }

    #[must_use]
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        lock(&self.routes).push(route.to_owned());
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Update worker driven by the test.
pub struct ScriptedWorker {
    events: broadcast::Sender<WorkerEvent>,
    fail_register: AtomicBool,
    registrations: AtomicUsize,
    checks: AtomicUsize,
    activations: AtomicUsize,
}

impl Default for ScriptedWorker {
    fn default() -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            events,
            fail_register: AtomicBool::new(false),
            registrations: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
            activations: AtomicUsize::new(0),
        }
    }
}

impl ScriptedWorker {
    pub fn fail_registration(&self) {
        self.fail_register.store(true, Ordering::SeqCst);
    }

    /// Publish `event`; returns false when nothing is listening.
    pub fn emit(&self, event: WorkerEvent) -> bool {
        self.events.send(event).is_ok()
    }

    #[must_use]
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdateWorker for ScriptedWorker {
    async fn register(&self) -> Result<(), UpdateError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(UpdateError::Status(404));
        }
        Ok(())
    }

    async fn update(&self) -> Result<(), UpdateError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn skip_waiting(&self) -> Result<(), UpdateError> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A fully wired client: session store with wishlist and cart registered
/// for teardown.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub session: Arc<SessionStore>,
    pub wishlist: Arc<WishlistStore>,
    pub cart: Arc<CartStore>,
    pub navigator: Arc<RecordingNavigator>,
    pub toasts: mpsc::UnboundedReceiver<Toast>,
}

impl Harness {
    pub const REDIRECT: &'static str = "https://market.example/";

    #[must_use]
    pub fn new(backend: MemoryBackend) -> Self {
        let backend = Arc::new(backend);
        let (notifier, toasts) = ChannelNotifier::channel();
        let notifier = Arc::new(notifier);
        let navigator = Arc::new(RecordingNavigator::default());

        let wishlist = Arc::new(WishlistStore::new(notifier.clone()));
        let cart = Arc::new(CartStore::new(notifier.clone()));
        let session = SessionStore::new(
            backend.clone(),
            notifier,
            navigator.clone(),
            Self::REDIRECT,
        )
        .with_teardown(wishlist.clone())
        .with_teardown(cart.clone());

        Self {
            backend,
            session: Arc::new(session),
            wishlist,
            cart,
            navigator,
            toasts,
        }
    }

    /// Collect every toast shown so far.
    pub fn drain_toasts(&mut self) -> Vec<Toast> {
        let mut toasts = Vec::new();
        while let Ok(toast) = self.toasts.try_recv() {
            toasts.push(toast);
        }
        toasts
    }
}

/// Wait until the session state satisfies `predicate`.
///
/// Returns the matching state, or `None` on timeout.
pub async fn wait_for_state(
    session: &SessionStore,
    predicate: impl FnMut(&AuthState) -> bool,
) -> Option<AuthState> {
    let mut states = session.subscribe();
    tokio::time::timeout(STATE_WAIT, async {
        states.wait_for(predicate).await.map(|state| AuthState::clone(&state))
    })
    .await
    .ok()
    .and_then(Result::ok)
}

// =============================================================================
// Fixtures
// =============================================================================

/// An active product.
#[must_use]
pub fn product(id: i64, name: &str, price: i64) -> Product {
    Product {
        id: ProductId::from(id),
        name: name.to_owned(),
        description: None,
        price: Decimal::new(price, 0),
        image_url: Some("img.png".to_owned()),
        store_id: None,
        category_id: None,
        stock: 5,
        is_active: true,
    }
}

/// Wishlist entry for [`product`].
#[must_use]
pub fn wishlist_item(id: i64, name: &str, price: i64) -> WishlistItem {
    WishlistItem::from_product(&product(id, name, price), None)
}

#[must_use]
pub fn category(name: &str, is_active: bool) -> Category {
    Category {
        id: CategoryId::new(uuid::Uuid::new_v4()),
        name: name.to_owned(),
        slug: None,
        image_url: None,
        is_active,
    }
}

#[must_use]
pub fn store(name: &str, is_active: bool) -> Store {
    Store {
        id: StoreId::new(uuid::Uuid::new_v4()),
        name: name.to_owned(),
        description: None,
        logo_url: None,
        owner_id: None,
        is_active,
    }
}
