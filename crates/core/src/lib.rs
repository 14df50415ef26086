//! Orderflow Core - Order aggregate types and validation.
//!
//! This crate provides the types shared by every orderflow component:
//! - `service` - Ingestion consumer, cache-aside read path, HTTP lookup
//! - `cli` - Migrations and manual publishing
//! - `integration-tests` - Wire-format and end-to-end tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no broker clients. An [`Order`] that passes [`validate`] satisfies
//! every invariant the rest of the system relies on; nothing downstream checks
//! them again.
//!
//! # Modules
//!
//! - [`types`] - The order aggregate (wire format) and the [`Email`] value type
//! - [`validation`] - Structural and cross-field checks on a decoded order

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{ValidationError, validate};
