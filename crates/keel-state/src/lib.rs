//! keel-state — embedded record store for Keel.
//!
//! Backed by [redb](https://docs.rs/redb), holds the records the deploy
//! pipeline produces: apps, configs, slugs, releases, and deploys.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Versioned records use `{app_id}:{version:010}` keys so a prefix scan
//! returns them oldest first; new versions are assigned inside the write
//! transaction that inserts them.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
