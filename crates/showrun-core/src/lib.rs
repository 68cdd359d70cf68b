//! Core types and trait definitions for the showrun episode pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod artifact;
pub mod batch;
pub mod context;
pub mod episode;
pub mod error;
pub mod facts;
pub mod generate;
pub mod project;
pub mod retcon;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
