//! Warehouse pick-list backend for ManaPool orders
//!
//! Aggregates unfulfilled marketplace orders into pick batches keyed by
//! card identity, resolves display metadata through a cached Scryfall
//! lookup chain, and tracks picking progress with an append-only event log.

pub mod broadcast;
pub mod db;
pub mod error;
pub mod logic;
pub mod manapool;
pub mod picking;
pub mod scryfall;
pub mod sync;
pub mod web;

pub use error::{Error, Result};
