//! Integration tests for the wishlist and cart.

#![allow(clippy::unwrap_used)]

use marketplace_client::cart::CartLine;
use marketplace_core::ProductId;
use marketplace_integration_tests::{Harness, MemoryBackend, product, wishlist_item};
use rust_decimal::Decimal;

// =============================================================================
// Wishlist
// =============================================================================

#[test]
fn test_added_item_is_contained_until_removed() {
    let harness = Harness::new(MemoryBackend::new());
    let wishlist = &harness.wishlist;

    for id in [1, 2, 3] {
        let item = wishlist_item(id, "Item", 10);
        wishlist.add(item);
        assert!(wishlist.contains(&ProductId::from(id)));

        assert!(wishlist.remove(&ProductId::from(id)));
        assert!(!wishlist.contains(&ProductId::from(id)));
    }
}

#[test]
fn test_duplicate_add_keeps_one_entry() {
    let mut harness = Harness::new(MemoryBackend::new());
    let item = wishlist_item(1, "X", 10);
    assert_eq!(item.image, "img.png");

    harness.wishlist.add(item.clone());
    harness.wishlist.add(item);

    assert_eq!(harness.wishlist.len(), 1);
    let titles: Vec<_> = harness
        .drain_toasts()
        .into_iter()
        .map(|toast| toast.title)
        .collect();
    assert_eq!(titles, ["Added to wishlist", "Already in wishlist"]);
}

#[test]
fn test_removing_missing_item_still_notifies() {
    let mut harness = Harness::new(MemoryBackend::new());
    harness.wishlist.add(wishlist_item(1, "X", 10));
    harness.drain_toasts();

    let removed = harness.wishlist.remove(&ProductId::from(999));

    assert!(!removed);
    assert_eq!(harness.wishlist.len(), 1);
    let toasts = harness.drain_toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].title, "Removed from wishlist");
}

#[test]
fn test_wishlist_snapshot_serializes_for_display() {
    let harness = Harness::new(MemoryBackend::new());
    harness.wishlist.add(wishlist_item(7, "Vase", 25));

    let json = serde_json::to_value(harness.wishlist.items()).unwrap();
    assert_eq!(json[0]["id"], 7);
    assert_eq!(json[0]["name"], "Vase");
    assert_eq!(json[0]["image"], "img.png");
}

// =============================================================================
// Cart
// =============================================================================

#[test]
fn test_cart_totals() {
    let harness = Harness::new(MemoryBackend::new());

    harness
        .cart
        .add(CartLine::from_product(&product(1, "Lamp", 40), 2));
    harness
        .cart
        .add(CartLine::from_product(&product(2, "Rug", 120), 1));
    harness
        .cart
        .add(CartLine::from_product(&product(1, "Lamp", 40), 1));

    assert_eq!(harness.cart.lines().len(), 2);
    assert_eq!(harness.cart.item_count(), 4);
    assert_eq!(harness.cart.subtotal(), Decimal::new(240, 0));
}

#[test]
fn test_cart_remove_only_notifies_on_effect() {
    let mut harness = Harness::new(MemoryBackend::new());
    harness
        .cart
        .add(CartLine::from_product(&product(1, "Lamp", 40), 1));
    harness.drain_toasts();

    assert!(!harness.cart.remove(&ProductId::from(999)));
    assert!(harness.drain_toasts().is_empty());

    assert!(harness.cart.remove(&ProductId::from(1)));
    assert_eq!(harness.drain_toasts()[0].title, "Removed from cart");
}

#[tokio::test]
async fn test_collections_observable() {
    let harness = Harness::new(MemoryBackend::new());
    let mut wishlist_rx = harness.wishlist.subscribe();
    let mut cart_rx = harness.cart.subscribe();

    harness.wishlist.add(wishlist_item(1, "X", 10));
    harness
        .cart
        .add(CartLine::from_product(&product(1, "X", 10), 1));

    wishlist_rx.changed().await.unwrap();
    cart_rx.changed().await.unwrap();
    assert_eq!(wishlist_rx.borrow().len(), 1);
    assert_eq!(cart_rx.borrow()[0].quantity, 1);
}
