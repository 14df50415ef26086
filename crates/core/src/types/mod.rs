//! Core types for orderflow.
//!
//! The order aggregate mirrors the JSON body of an ingested message field for
//! field, and [`Email`] wraps address parsing.

pub mod email;
pub mod order;

pub use email::{Email, EmailError};
pub use order::{Delivery, Item, Order, Payment};
