//! Catalog listing commands.

use marketplace_client::baas::{Product, ProductQuery};
use marketplace_client::catalog::CatalogClient;
use marketplace_core::{CategoryId, CurrencyCode, Price, ProductId, StoreId};

use super::{App, CliError};

fn client(app: &App) -> CatalogClient {
    CatalogClient::new(app.backend.clone())
}

fn log_product(product: &Product) {
    let price = Price::new(product.price, CurrencyCode::default());
    tracing::info!(
        id = %product.id,
        name = %product.name,
        %price,
        stock = product.stock,
        "Product"
    );
}

pub async fn categories(app: &App) -> Result<(), CliError> {
    let categories = client(app).categories().await?;
    for category in &categories {
        tracing::info!(id = %category.id, name = %category.name, "Category");
    }
    tracing::info!(count = categories.len(), "Categories listed");
    Ok(())
}

pub async fn stores(app: &App) -> Result<(), CliError> {
    let stores = client(app).stores().await?;
    for store in &stores {
        tracing::info!(id = %store.id, name = %store.name, "Store");
    }
    tracing::info!(count = stores.len(), "Stores listed");
    Ok(())
}

pub async fn products(
    app: &App,
    store: Option<StoreId>,
    category: Option<CategoryId>,
    limit: Option<usize>,
) -> Result<(), CliError> {
    let query = ProductQuery {
        store_id: store,
        category_id: category,
        limit,
    };

    let products = client(app).products(query).await?;
    for product in &products {
        log_product(product);
    }
    tracing::info!(count = products.len(), "Products listed");
    Ok(())
}

/// Show one product. Numeric ids are looked up as row keys, anything else
/// as a slug.
pub async fn product(app: &App, id: &str) -> Result<(), CliError> {
    let id = id
        .parse::<i64>()
        .map_or_else(|_| ProductId::from(id), ProductId::from);

    match client(app).product(&id).await? {
        Some(product) => log_product(&product),
        None => tracing::warn!(%id, "Product not found"),
    }
    Ok(())
}
