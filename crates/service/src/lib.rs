//! Orderflow service library.
//!
//! Ingests orders from the broker into `PostgreSQL` and serves lookups
//! through an in-process LRU cache. Exposed as a library so the pieces can be
//! tested and wired together by the binary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;
