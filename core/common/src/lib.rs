//! Common utilities and types shared across the Concur crates.
//!
//! This module provides foundational types that are used throughout the codebase,
//! ensuring consistency and type safety between the local vault, the remote
//! API client and the sync core.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{StoreId, VaultPath};
