//! Integration tests for cached catalog reads.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use marketplace_client::baas::ProductQuery;
use marketplace_client::catalog::CatalogClient;
use marketplace_core::ProductId;
use marketplace_integration_tests::{MemoryBackend, category, product, store};

fn catalog_backend() -> Arc<MemoryBackend> {
    let vendor = store("Clay & Co", true);
    let ceramics = category("Ceramics", true);

    let mut vase = product(1, "Vase", 25);
    vase.store_id = Some(vendor.id);
    vase.category_id = Some(ceramics.id);
    let mut bowl = product(2, "Bowl", 15);
    bowl.store_id = Some(vendor.id);
    let mut retired = product(3, "Retired", 5);
    retired.is_active = false;

    Arc::new(
        MemoryBackend::new()
            .with_stores(vec![vendor, store("Closed shop", false)])
            .with_categories(vec![ceramics, category("Hidden", false)])
            .with_products(vec![vase, bowl, retired]),
    )
}

#[tokio::test]
async fn test_listings_exclude_inactive() {
    let backend = catalog_backend();
    let catalog = CatalogClient::new(backend.clone());

    let stores = catalog.stores().await.unwrap();
    assert_eq!(stores.len(), 1);
    assert_eq!(stores[0].name, "Clay & Co");

    let categories = catalog.categories().await.unwrap();
    assert_eq!(categories.len(), 1);

    let products = catalog.products(ProductQuery::default()).await.unwrap();
    assert_eq!(products.len(), 2);
}

#[tokio::test]
async fn test_repeat_reads_served_from_cache() {
    let backend = catalog_backend();
    let catalog = CatalogClient::new(backend.clone());

    catalog.categories().await.unwrap();
    catalog.categories().await.unwrap();
    catalog.stores().await.unwrap();
    catalog.stores().await.unwrap();

    assert_eq!(backend.catalog_queries(), 2);
}

#[tokio::test]
async fn test_product_queries_cached_per_filter() {
    let backend = catalog_backend();
    let catalog = CatalogClient::new(backend.clone());
    let vendor_id = catalog.stores().await.unwrap()[0].id;
    let ceramics_id = catalog.categories().await.unwrap()[0].id;
    let baseline = backend.catalog_queries();

    let by_store = catalog
        .products(ProductQuery::for_store(vendor_id))
        .await
        .unwrap();
    let by_category = catalog
        .products(ProductQuery::for_category(ceramics_id))
        .await
        .unwrap();
    let limited = catalog
        .products(ProductQuery::for_store(vendor_id).with_limit(1))
        .await
        .unwrap();
    catalog
        .products(ProductQuery::for_store(vendor_id))
        .await
        .unwrap();

    assert_eq!(by_store.len(), 2);
    assert_eq!(by_category.len(), 1);
    assert_eq!(limited.len(), 1);
    assert_eq!(backend.catalog_queries(), baseline + 3);
}

#[tokio::test]
async fn test_single_product_lookup() {
    let backend = catalog_backend();
    let catalog = CatalogClient::new(backend.clone());

    let vase = catalog.product(&ProductId::from(1)).await.unwrap().unwrap();
    assert_eq!(vase.name, "Vase");
    assert!(vase.in_stock());

    assert!(catalog.product(&ProductId::from(3)).await.unwrap().is_none());
    assert!(catalog.product(&ProductId::from(3)).await.unwrap().is_none());

    // Misses are cached too
    assert_eq!(backend.catalog_queries(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let backend = catalog_backend();
    let catalog = CatalogClient::new(backend.clone());

    catalog.categories().await.unwrap();
    catalog.invalidate();
    catalog.categories().await.unwrap();

    assert_eq!(backend.catalog_queries(), 2);
}

#[tokio::test]
async fn test_clones_share_cache() {
    let backend = catalog_backend();
    let catalog = CatalogClient::new(backend.clone());
    let clone = catalog.clone();

    catalog.stores().await.unwrap();
    clone.stores().await.unwrap();

    assert_eq!(backend.catalog_queries(), 1);
}
