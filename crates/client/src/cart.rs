//! Shopping cart.
//!
//! In-memory only, like the wishlist. Lines are unique by product id;
//! adding a product that is already in the cart increases its quantity.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use marketplace_core::ProductId;

use crate::baas::Product;
use crate::lifecycle::Teardown;
use crate::notify::{Notifier, Toast};

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub quantity: u32,
}

impl CartLine {
    #[must_use]
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            image: product.image_url.clone(),
            quantity,
        }
    }

    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// The cart and its notifications.
pub struct CartStore {
    lines: watch::Sender<Vec<CartLine>>,
    notifier: Arc<dyn Notifier>,
}

impl CartStore {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            lines: watch::Sender::new(Vec::new()),
            notifier,
        }
    }

    /// Add `line.quantity` units of the line's product.
    ///
    /// A zero quantity is ignored.
    pub fn add(&self, line: CartLine) {
        if line.quantity == 0 {
            return;
        }

        let name = line.name.clone();
        self.lines.send_modify(|lines| {
            match lines.iter_mut().find(|existing| existing.id == line.id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                }
                None => lines.push(line),
            }
        });

        debug!(product = %name, "Added to cart");
        self.notifier.notify(
            Toast::new("Added to cart").with_description(format!("{name} has been added to your cart.")),
        );
    }

    /// Set the quantity of an existing line; zero removes it.
    ///
    /// Returns whether a line with `id` existed.
    pub fn set_quantity(&self, id: &ProductId, quantity: u32) -> bool {
        let mut found = false;
        self.lines.send_if_modified(|lines| {
            let Some(pos) = lines.iter().position(|line| &line.id == id) else {
                return false;
            };
            found = true;
            if quantity == 0 {
                lines.remove(pos);
                return true;
            }
            lines.get_mut(pos).is_some_and(|line| {
                let changed = line.quantity != quantity;
                line.quantity = quantity;
                changed
            })
        });
        found
    }

    /// Remove the line for `id`. Returns whether anything was removed.
    pub fn remove(&self, id: &ProductId) -> bool {
        let removed = self.lines.send_if_modified(|lines| {
            let before = lines.len();
            lines.retain(|line| &line.id != id);
            lines.len() != before
        });

        if removed {
            self.notifier.notify(
                Toast::new("Removed from cart")
                    .with_description("The item has been removed from your cart."),
            );
        }
        removed
    }

    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.lines.borrow().clone()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .borrow()
            .iter()
            .fold(0, |total, line| total.saturating_add(line.quantity))
    }

    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.borrow().iter().map(CartLine::line_total).sum()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<CartLine>> {
        self.lines.subscribe()
    }
}

impl Teardown for CartStore {
    fn teardown(&self) {
        self.lines.send_if_modified(|lines| {
            let had_lines = !lines.is_empty();
            lines.clear();
            had_lines
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelNotifier;

    fn line(id: i64, price: i64, quantity: u32) -> CartLine {
        CartLine {
            id: ProductId::from(id),
            name: format!("Product {id}"),
            unit_price: Decimal::new(price, 0),
            image: None,
            quantity,
        }
    }

    fn cart() -> CartStore {
        let (notifier, _rx) = ChannelNotifier::channel();
        CartStore::new(Arc::new(notifier))
    }

    #[test]
    fn test_add_merges_quantities() {
        let cart = cart();
        cart.add(line(1, 10, 1));
        cart.add(line(1, 10, 2));
        cart.add(line(2, 5, 1));

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.subtotal(), Decimal::new(35, 0));
    }

    #[test]
    fn test_zero_quantity_add_ignored() {
        let cart = cart();
        cart.add(line(1, 10, 0));
        assert!(cart.lines().is_empty());
    }

    #[test]
    fn test_set_quantity() {
        let cart = cart();
        cart.add(line(1, 10, 1));

        assert!(cart.set_quantity(&ProductId::from(1), 5));
        assert_eq!(cart.item_count(), 5);

        assert!(cart.set_quantity(&ProductId::from(1), 0));
        assert!(cart.lines().is_empty());

        assert!(!cart.set_quantity(&ProductId::from(1), 3));
    }

    #[test]
    fn test_remove_reports_effect() {
        let cart = cart();
        cart.add(line(1, 10, 1));
        assert!(cart.remove(&ProductId::from(1)));
        assert!(!cart.remove(&ProductId::from(1)));
    }

    #[test]
    fn test_teardown_clears() {
        let cart = cart();
        cart.add(line(1, 10, 2));
        cart.teardown();
        assert_eq!(cart.item_count(), 0);
        assert_eq!(cart.subtotal(), Decimal::ZERO);
    }
}
