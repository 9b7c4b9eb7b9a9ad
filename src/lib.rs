//! d-config: control plane of a configuration center.
//!
//! Clients publish, query and delete configuration items that may exist in
//! a formal, an IP-scoped beta and any number of tag-scoped versions.
//! Remote consumers watch keys through long polling: they declare the
//! digests they hold and are answered as soon as one of them goes stale.
//!
//! ```text
//! write ─► VariantResolver ─► ConfigStore
//!                 │
//!                 └─► ChangeEventBus ─► LongPollManager ─► waiting clients
//! ```

mod config;
pub mod constants;
mod core;
mod errors;
mod metrics;
pub mod network;
mod service;
mod storage;
pub mod utils;

pub use crate::config::*;
pub use crate::core::*;
pub use crate::errors::*;
pub use crate::metrics::*;
pub use crate::service::*;
pub use crate::storage::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
