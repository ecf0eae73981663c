//! Local vault abstraction for Concur.
//!
//! This module provides a trait-based interface over the local document
//! store that the sync core reconciles against, plus two implementations:
//! a filesystem-backed vault and an in-memory vault.
//!
//! # Design Principles
//! - Vault isolation: the sync core only sees `LocalVault`, never paths on disk
//! - Async operations: all I/O operations are async
//! - Read-only references: `LocalFileRef` is a snapshot, mutations go through the vault

pub mod local;
pub mod memory;
pub mod vault;

pub use local::FsVault;
pub use memory::MemoryVault;
pub use vault::{FileStat, LocalFileRef, LocalVault};
