//! Core types and trait definitions for the PIES record service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod codes;
pub mod datetime;
pub mod document;
pub mod error;
pub mod store;

pub use error::{Error, Result};
