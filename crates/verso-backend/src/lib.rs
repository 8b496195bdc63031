//! Key-value backend contract for Verso.
//!
//! Verso's commit protocol needs nothing from its storage beyond the
//! primitives a wide-column store like DynamoDB offers per item: reads,
//! unconditional writes, conditional writes guarded by a version token, and
//! batched reads. There are no multi-item transactions; every cross-item
//! invariant is maintained by the layers above.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`InMemoryBackend`] -- `BTreeMap`-based store for tests and embedding
//! - [`TimedBackend`] -- wraps another backend with a per-call timeout
//! - [`FaultInjectingBackend`] -- scripted failures for protocol tests
//!
//! # Design Rules
//!
//! 1. `conditional_put_item` is the only atomic primitive; it compares and
//!    replaces exactly one item.
//! 2. Batch reads may return partial results. A missing key is absent from
//!    the result map, never an error.
//! 3. Backends never interpret item payloads; [`codec`] is the single place
//!    records are turned into bytes.
//! 4. Errors carry enough context for [`BackendError::is_transient`] to
//!    classify them.

pub mod codec;
pub mod error;
pub mod fault;
pub mod item;
pub mod keys;
pub mod memory;
pub mod timed;
pub mod traits;

pub use codec::{decode, encode, CodecError};
pub use error::{BackendError, BackendResult};
pub use fault::{FaultInjectingBackend, FaultPlan};
pub use item::{Expected, Item, ScanPage, WriteOutcome};
pub use memory::{BackendStats, InMemoryBackend};
pub use timed::TimedBackend;
pub use traits::Backend;
