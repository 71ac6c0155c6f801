//! Marketplace Core - Shared types library.
//!
//! This crate provides common types used across all marketplace components:
//! - `client` - Session, wishlist, cart, catalog and update state over the BaaS
//! - `cli` - Command-line driver for the client
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients,
//! no async runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
