//! Core types, storage traits and the reconciliation engine for the tutoring
//! backend's student model.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement the traits in [`store`]; the engine in [`reconcile`] and
//! the assembler in [`context`] are generic over them.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod context;
pub mod curriculum;
pub mod delta;
pub mod error;
pub mod mastery;
pub mod memory;
pub mod pipeline;
pub mod profile;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod student;

pub use error::{DeltaArea, Error, ErrorKind, ItemError, Partial, Result};
