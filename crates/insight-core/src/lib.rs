//! Core types and trait definitions for the Insight knowledge base.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! storage backend, the text-generation client and the synthesis engine all
//! depend on it; it depends on nothing of theirs.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod document;
pub mod error;
pub mod fragment;
pub mod generate;
pub mod question;
pub mod response;
pub mod store;
pub mod tag;
pub mod version;

pub use error::{Error, Result};
pub use generate::{GenerateError, Generator};
pub use version::{VersionClock, VersionStamp};
