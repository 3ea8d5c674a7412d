//! The ledger service

use crate::backend::{LedgerBackend, MemoryBackend};
use crate::block::{verify_links, Block, ChainError, GENESIS_PREVIOUS_HASH};
use crate::transaction::{
    AccessLogEntry, ConsentEntry, MedicalRecordEntry, RevocationEntry, Transaction,
    TransactionId, TransactionKind, TransactionPayload,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use swasthya_shared::{new_id, Clock, LedgerConfig};
use tracing::{debug, info};

/// The ledger operations consent and access control depend on.
///
/// Anything that can append and query events satisfies the consumers, so a
/// real distributed ledger can stand in for [`Ledger`].
pub trait TransactionLog: Send + Sync {
    /// Record an event; it is visible to queries as soon as this returns
    fn append(&self, payload: TransactionPayload) -> TransactionId;

    /// Every event about `subject_id`, oldest first
    fn transactions_for_subject(&self, subject_id: &str) -> Vec<Transaction>;

    /// Legacy check: has any consent transaction ever been recorded for the pair
    fn verify(&self, doctor_id: &str, patient_id: &str) -> bool;
}

/// A transaction together with where it sits in the chain
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// `None` while the transaction is still pending
    pub block_index: Option<u64>,
    pub transaction_id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub kind: TransactionKind,
    pub payload: TransactionPayload,
}

struct LedgerState {
    backend: Box<dyn LedgerBackend>,
    pending: Vec<Transaction>,
}

impl LedgerState {
    /// Sealed transactions in chain order followed by pending ones,
    /// each paired with its block index
    fn iter_all(&self) -> impl Iterator<Item = (Option<u64>, &Transaction)> + '_ {
        self.backend
            .blocks()
            .iter()
            .flat_map(|b| b.transactions.iter().map(move |tx| (Some(b.index), tx)))
            .chain(self.pending.iter().map(|tx| (None, tx)))
    }

    fn seal(&mut self, proof: u64, timestamp: DateTime<Utc>) -> Block {
        let previous_hash = self
            .backend
            .last()
            .map(Block::hash)
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());

        let block = Block {
            index: self.backend.len() as u64 + 1,
            timestamp,
            transactions: std::mem::take(&mut self.pending),
            proof,
            previous_hash,
        };
        self.backend.push(block.clone());
        block
    }
}

/// Append-only, block-structured transaction history.
///
/// A single mutex guards the pending set and the chain, so appends and
/// seals never interleave.
pub struct Ledger {
    state: Mutex<LedgerState>,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    /// In-memory ledger with default configuration and a genesis block
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(LedgerConfig::default(), clock)
    }

    pub fn with_config(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_backend(Box::new(MemoryBackend::new()), config, clock)
    }

    /// Wrap an existing backend, sealing a genesis block if it is empty
    pub fn with_backend(
        backend: Box<dyn LedgerBackend>,
        config: LedgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut state = LedgerState {
            backend,
            pending: Vec::new(),
        };
        if state.backend.is_empty() {
            let genesis = state.seal(config.genesis_proof, clock.now());
            info!(proof = genesis.proof, "sealed genesis block");
        }

        Self {
            state: Mutex::new(state),
            config,
            clock,
        }
    }

    // A panic elsewhere never leaves the state half-written: every critical
    // section mutates only after it has everything it needs.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a transaction to the pending set and return its id
    pub fn append(&self, payload: TransactionPayload) -> TransactionId {
        let transaction = Transaction {
            id: new_id(),
            timestamp: self.clock.now(),
            payload,
        };
        let id = transaction.id.clone();

        let mut state = self.lock();
        debug!(
            tx_id = %id,
            kind = %transaction.kind(),
            subject = %transaction.subject(),
            "appended transaction"
        );
        state.pending.push(transaction);

        if let Some(threshold) = self.config.auto_seal_after {
            if state.pending.len() >= threshold {
                let block = state.seal(self.config.default_proof, self.clock.now());
                info!(
                    index = block.index,
                    transactions = block.transactions.len(),
                    "auto-sealed block"
                );
            }
        }

        id
    }

    /// Move every pending transaction into a new block
    pub fn seal_block(&self, proof: u64) -> Block {
        let timestamp = self.clock.now();
        let block = self.lock().seal(proof, timestamp);
        info!(
            index = block.index,
            transactions = block.transactions.len(),
            "sealed block"
        );
        block
    }

    /// Record an uploaded medical record
    pub fn record_medical_data(
        &self,
        patient_id: &str,
        record_hash: &str,
        ipfs_hash: &str,
        metadata: BTreeMap<String, String>,
    ) -> TransactionId {
        self.append(TransactionPayload::MedicalRecord(MedicalRecordEntry {
            patient_id: patient_id.to_string(),
            record_hash: record_hash.to_string(),
            ipfs_hash: ipfs_hash.to_string(),
            metadata,
        }))
    }

    pub fn record_consent(&self, entry: ConsentEntry) -> TransactionId {
        self.append(TransactionPayload::Consent(entry))
    }

    pub fn record_revocation(&self, entry: RevocationEntry) -> TransactionId {
        self.append(TransactionPayload::ConsentRevocation(entry))
    }

    pub fn record_access(&self, entry: AccessLogEntry) -> TransactionId {
        self.append(TransactionPayload::AccessLog(entry))
    }

    /// Every transaction about `subject_id`: sealed blocks in chain order,
    /// then pending transactions, preserving insertion order
    pub fn transactions_for_subject(&self, subject_id: &str) -> Vec<Transaction> {
        self.lock()
            .iter_all()
            .filter(|(_, tx)| tx.subject() == subject_id)
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    /// Like [`Ledger::transactions_for_subject`] but annotated with block positions
    pub fn history(&self, subject_id: &str) -> Vec<HistoryEntry> {
        self.lock()
            .iter_all()
            .filter(|(_, tx)| tx.subject() == subject_id)
            .map(|(block_index, tx)| HistoryEntry {
                block_index,
                transaction_id: tx.id.clone(),
                timestamp: tx.timestamp,
                kind: tx.kind(),
                payload: tx.payload.clone(),
            })
            .collect()
    }

    /// True iff a consent transaction exists for the pair.
    ///
    /// Scans newest first and stops at the first match. This says nothing
    /// about revocation or expiry; authorization uses the consent store.
    pub fn verify(&self, doctor_id: &str, patient_id: &str) -> bool {
        let state = self.lock();
        let pending = state.pending.iter().rev();
        let sealed = state
            .backend
            .blocks()
            .iter()
            .rev()
            .flat_map(|b| b.transactions.iter().rev());

        pending
            .chain(sealed)
            .any(|tx| tx.payload.is_consent_between(doctor_id, patient_id))
    }

    pub fn last_block(&self) -> Option<Block> {
        self.lock().backend.last().cloned()
    }

    pub fn hash_block(block: &Block) -> String {
        block.hash()
    }

    /// Snapshot of every sealed block, suitable for external persistence
    pub fn chain(&self) -> Vec<Block> {
        self.lock().backend.blocks().to_vec()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.lock().pending.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn block_count(&self) -> usize {
        self.lock().backend.len()
    }

    /// Check that every block links to the hash of its predecessor
    pub fn verify_chain(&self) -> Result<(), ChainError> {
        verify_links(self.lock().backend.blocks())
    }
}

impl TransactionLog for Ledger {
    fn append(&self, payload: TransactionPayload) -> TransactionId {
        Ledger::append(self, payload)
    }

    fn transactions_for_subject(&self, subject_id: &str) -> Vec<Transaction> {
        Ledger::transactions_for_subject(self, subject_id)
    }

    fn verify(&self, doctor_id: &str, patient_id: &str) -> bool {
        Ledger::verify(self, doctor_id, patient_id)
    }
}
