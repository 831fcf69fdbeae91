//! metagrid-state — transactional key-value store for Metagrid metadata.
//!
//! Backed by [redb](https://docs.rs/redb). redb serializes writers, so
//! optimistic concurrency is layered on top: a [`Transaction`] reads from the
//! snapshot taken when it began, buffers its writes, and on commit is checked
//! against every key written since that snapshot. A transaction whose reads
//! were invalidated fails with [`StateError::Conflict`] and is expected to be
//! re-run from the top, which [`run_transaction`] does.
//!
//! # Keyspace
//!
//! Keys starting with `0xff` are the reserved system keyspace and require
//! [`TransactionOption::AccessSystemKeys`]. Metadata collections live under
//! [`Subspace`] prefixes there; composite keys use the order-preserving
//! [`tuple`] encoding. Record values are versioned JSON envelopes (see
//! [`codec`]).

pub mod codec;
pub mod error;
pub mod retry;
pub mod store;
pub mod subspace;
pub mod tables;
pub mod tuple;

pub use codec::VersionedRecord;
pub use error::{StateError, StateResult};
pub use retry::{RetryPolicy, Retryable, run_transaction};
pub use store::{KvStore, Transaction, TransactionOption};
pub use subspace::{Subspace, key_after, strinc};
