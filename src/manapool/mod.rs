//! ManaPool seller API client: order listing and detail fetching

mod client;
pub mod model;

pub use client::{FetchedOrder, ManapoolClient, ManapoolConfig};
pub use model::{Order, OrderItem, OrderSummary, ShippingAddress, Single};
