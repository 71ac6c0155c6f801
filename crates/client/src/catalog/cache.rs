//! Cache types for catalog responses.

use marketplace_core::ProductId;

use crate::baas::{Category, Product, ProductQuery, Store};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Categories,
    Stores,
    Products(ProductQuery),
    Product(ProductId),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Categories(Vec<Category>),
    Stores(Vec<Store>),
    Products(Vec<Product>),
    /// `None` caches a miss so unknown ids are not re-queried every render.
    Product(Option<Box<Product>>),
}
