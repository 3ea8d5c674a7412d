//! Swasthya Ledger
//!
//! Append-only history of domain events grouped into blocks.
//!
//! # Model
//!
//! - Every event is a [`Transaction`] with a strongly-typed
//!   [`TransactionPayload`]: medical record uploads, consent grants,
//!   consent revocations and access logs.
//! - Appended transactions land in a pending set and are visible to queries
//!   immediately. [`Ledger::seal_block`] moves them into a [`Block`] whose
//!   `previous_hash` is the SHA-256 of the block before it.
//! - Sealed blocks are stored behind a [`LedgerBackend`]; the bundled
//!   [`MemoryBackend`] keeps them in process memory.
//!
//! The ledger is single-node and **not crash-durable**. Callers that need
//! durability persist [`Ledger::chain`] snapshots themselves and restore them
//! with [`MemoryBackend::from_blocks`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use swasthya_ledger::{Ledger, TransactionKind};
//! use swasthya_shared::SystemClock;
//!
//! let ledger = Ledger::new(Arc::new(SystemClock));
//! ledger.record_medical_data("patient-1", "sha256-of-file", "Qm123", Default::default());
//!
//! let history = ledger.transactions_for_subject("patient-1");
//! assert_eq!(history[0].kind(), TransactionKind::MedicalRecord);
//! ```

pub mod backend;
pub mod block;
pub mod ledger;
pub mod transaction;

pub use backend::{LedgerBackend, MemoryBackend};
pub use block::{Block, ChainError, GENESIS_PREVIOUS_HASH};
pub use ledger::{HistoryEntry, Ledger, TransactionLog};
pub use transaction::{
    AccessLogEntry, ConsentEntry, MedicalRecordEntry, RevocationEntry, Transaction,
    TransactionId, TransactionKind, TransactionPayload,
};
