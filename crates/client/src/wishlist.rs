//! Shopper wishlist.
//!
//! Held in memory for the lifetime of the session; nothing is persisted.
//! Items are unique by product id and keep insertion order.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use marketplace_core::ProductId;

use crate::baas::Product;
use crate::lifecycle::Teardown;
use crate::notify::{Notifier, Toast};

/// A product saved to the wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
}

impl WishlistItem {
    /// Snapshot a catalog product. Products without an image get an empty
    /// image path.
    #[must_use]
    pub fn from_product(product: &Product, store_name: Option<&str>) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            image: product.image_url.clone().unwrap_or_default(),
            store_name: store_name.map(str::to_owned),
        }
    }
}

/// The wishlist and its notifications.
pub struct WishlistStore {
    items: watch::Sender<Vec<WishlistItem>>,
    notifier: Arc<dyn Notifier>,
}

impl WishlistStore {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            items: watch::Sender::new(Vec::new()),
            notifier,
        }
    }

    /// Add `item` unless its id is already present.
    ///
    /// Returns whether the wishlist changed. Either way the user is told
    /// what happened.
    pub fn add(&self, item: WishlistItem) -> bool {
        let name = item.name.clone();
        let added = self.items.send_if_modified(|items| {
            if items.iter().any(|existing| existing.id == item.id) {
                false
            } else {
                items.push(item);
                true
            }
        });

        if added {
            debug!(product = %name, "Added to wishlist");
            self.notifier.notify(
                Toast::new("Added to wishlist")
                    .with_description(format!("{name} has been added to your wishlist.")),
            );
        } else {
            self.notifier.notify(
                Toast::new("Already in wishlist")
                    .with_description(format!("{name} is already in your wishlist.")),
            );
        }
        added
    }

    /// Remove the item with `id`.
    ///
    /// Returns whether anything was removed. The removal toast is shown
    /// either way; callers that care about the difference use the return
    /// value.
    pub fn remove(&self, id: &ProductId) -> bool {
        let removed = self.items.send_if_modified(|items| {
            let before = items.len();
            items.retain(|item| &item.id != id);
            items.len() != before
        });

        debug!(product_id = %id, removed, "Wishlist remove");
        self.notifier.notify(
            Toast::new("Removed from wishlist")
                .with_description("The item has been removed from your wishlist."),
        );
        removed
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.items.borrow().iter().any(|item| &item.id == id)
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<WishlistItem> {
        self.items.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Receiver that observes every change to the items.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<WishlistItem>> {
        self.items.subscribe()
    }
}

impl Teardown for WishlistStore {
    fn teardown(&self) {
        self.items.send_if_modified(|items| {
            let had_items = !items.is_empty();
            items.clear();
            had_items
        });
    }
}
