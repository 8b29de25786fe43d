//! docsync
//!
//! Keeps a vector-indexed search store consistent with a watched directory
//! of documents, combining live filesystem notifications with periodic full
//! reconciliation.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embeddings;
pub mod error;
pub mod loader;
pub mod observability;
pub mod storage;
pub mod sync;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
