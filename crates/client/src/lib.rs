//! Marketplace client library.
//!
//! Client-side state for the marketplace: who is signed in and what they may
//! do, the shopper's wishlist and cart, catalog browsing, and detection of new
//! application builds. All persistence and authorization live in the hosted
//! backend (BaaS); this crate is the state layer over its REST API.
//!
//! # Architecture
//!
//! - [`baas`] - Backend traits and the `reqwest`-based [`baas::RestBackend`]
//! - [`session`] - [`session::SessionStore`], the authentication state machine
//! - [`wishlist`] / [`cart`] - In-memory shopper collections
//! - [`catalog`] - Cached reads of active categories, stores and products
//! - [`update`] - Background update checking and activation
//! - [`notify`] / [`lifecycle`] - Collaborators the stores report through
//!
//! Every store is an explicitly constructed value shared by `Arc`; state is
//! observed through `tokio::sync::watch` receivers rather than ambient
//! globals.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod baas;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod lifecycle;
pub mod notify;
pub mod session;
pub mod telemetry;
pub mod update;
pub mod wishlist;
