//! tagdb is the storage core of an event database: a content-addressed,
//! signature-authenticated event store over an embedded ordered key-value
//! engine.
//!
//! Events are self-contained signed records (pubkey, timestamp, content,
//! tags, signature) identified by the SHA-256 of their canonical textual
//! form. There are no record kinds; all classification goes through tags.
//! Each insert allocates a monotonic 40-bit serial and writes the binary
//! event plus a family of prefix-sorted secondary index keys in one atomic
//! batch; queries pick the narrowest index for the filter shape, scan a
//! bounded key prefix, and re-validate candidates against the exact
//! predicate before returning ids sorted by timestamp.

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod hashes;
pub mod keys;
pub mod logging;
pub mod numbers;
pub mod signer;
pub mod store;
pub mod text;

pub use config::Config;
pub use error::{Result, StoreError};
pub use event::{Event, EventId, Payload, Tag};
pub use filter::{Filter, SortOrder, TagQuery};
pub use signer::{KeypairSigner, Signer};
pub use store::{Database, EventSummary};
