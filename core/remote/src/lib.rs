//! Remote store API for Concur.
//!
//! The sync core talks to the remote store only through [`RemoteApi`].
//! [`HttpRemote`] speaks the JSON-over-HTTP protocol of the Concur server;
//! [`MemoryRemote`] keeps everything in memory and can be told to fail, for
//! tests and local experiments.

pub mod api;
pub mod http;
pub mod memory;
pub mod models;

pub use api::RemoteApi;
pub use http::HttpRemote;
pub use memory::MemoryRemote;
pub use models::{FilesResponse, NewStore, RemoteFileRecord, StoreInfo, SyncedFile};
