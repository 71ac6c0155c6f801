//! Catalog browsing.
//!
//! Read-only views of active categories, stores and products. Results are
//! cached using `moka` (5-minute TTL) since listings change rarely and are
//! read on every page.

mod cache;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use marketplace_core::ProductId;

use crate::baas::{BackendError, CatalogSource, Category, Product, ProductQuery, Store};

use cache::{CacheKey, CacheValue};

const CACHE_CAPACITY: u64 = 1000;
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Cached catalog reads.
///
/// Cheaply cloneable; clones share the cache.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    source: Arc<dyn CatalogSource>,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogClient {
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(CatalogClientInner { source, cache }),
        }
    }

    /// Active categories, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, BackendError> {
        if let Some(CacheValue::Categories(categories)) =
            self.inner.cache.get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories = self.inner.source.active_categories().await?;
        self.inner
            .cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(categories.clone()),
            )
            .await;
        Ok(categories)
    }

    /// Active stores, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self))]
    pub async fn stores(&self) -> Result<Vec<Store>, BackendError> {
        if let Some(CacheValue::Stores(stores)) = self.inner.cache.get(&CacheKey::Stores).await {
            debug!("Cache hit for stores");
            return Ok(stores);
        }

        let stores = self.inner.source.active_stores().await?;
        self.inner
            .cache
            .insert(CacheKey::Stores, CacheValue::Stores(stores.clone()))
            .await;
        Ok(stores)
    }

    /// Active products matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self))]
    pub async fn products(&self, query: ProductQuery) -> Result<Vec<Product>, BackendError> {
        let cache_key = CacheKey::Products(query.clone());

        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products = self.inner.source.active_products(&query).await?;
        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// A single active product, or `None` if it does not exist or is
    /// inactive.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: &ProductId) -> Result<Option<Product>, BackendError> {
        let cache_key = CacheKey::Product(id.clone());

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(product.map(|p| *p));
        }

        let product = self.inner.source.product(id).await?;
        self.inner
            .cache
            .insert(
                cache_key,
                CacheValue::Product(product.clone().map(Box::new)),
            )
            .await;
        Ok(product)
    }

    /// Drop every cached listing.
    pub fn invalidate(&self) {
        self.inner.cache.invalidate_all();
    }
}
