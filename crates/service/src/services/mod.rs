//! Business logic services.
//!
//! # Services
//!
//! - `orders` - Cache-aside coordination between the order store and cache

pub mod orders;

pub use orders::OrderService;
