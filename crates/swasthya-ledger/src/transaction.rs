//! Typed ledger transactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use swasthya_shared::{AccessType, Action};

pub type TransactionId = String;

/// Discriminant of a [`TransactionPayload`]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    MedicalRecord,
    Consent,
    ConsentRevocation,
    AccessLog,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::MedicalRecord => "medical_record",
            TransactionKind::Consent => "consent",
            TransactionKind::ConsentRevocation => "consent_revocation",
            TransactionKind::AccessLog => "access_log",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A medical record was uploaded and content-addressed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MedicalRecordEntry {
    pub patient_id: String,
    /// SHA-256 of the plaintext file
    pub record_hash: String,
    /// Content address of the encrypted file
    pub ipfs_hash: String,
    pub metadata: BTreeMap<String, String>,
}

/// A patient approved a doctor's consent request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentEntry {
    pub patient_id: String,
    pub doctor_id: String,
    pub grant_id: String,
    pub access_type: AccessType,
    pub record_ids: Option<BTreeSet<String>>,
    pub duration_hours: u32,
}

/// A patient revoked an approved grant
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevocationEntry {
    pub patient_id: String,
    pub doctor_id: String,
    pub grant_id: String,
    #[serde(rename = "timestamp")]
    pub revoked_at: DateTime<Utc>,
}

/// A non-owner accessed a patient's data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessLogEntry {
    pub patient_id: String,
    pub accessor_id: String,
    /// `None` when the access covered the patient's records as a whole
    pub record_id: Option<String>,
    pub action: Action,
    pub is_emergency: bool,
    #[serde(rename = "timestamp")]
    pub accessed_at: DateTime<Utc>,
}

/// Event payload, tagged with its transaction type on the wire
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionPayload {
    MedicalRecord(MedicalRecordEntry),
    Consent(ConsentEntry),
    ConsentRevocation(RevocationEntry),
    AccessLog(AccessLogEntry),
}

impl TransactionPayload {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionPayload::MedicalRecord(_) => TransactionKind::MedicalRecord,
            TransactionPayload::Consent(_) => TransactionKind::Consent,
            TransactionPayload::ConsentRevocation(_) => TransactionKind::ConsentRevocation,
            TransactionPayload::AccessLog(_) => TransactionKind::AccessLog,
        }
    }

    /// The patient this event is about
    pub fn subject(&self) -> &str {
        match self {
            TransactionPayload::MedicalRecord(e) => &e.patient_id,
            TransactionPayload::Consent(e) => &e.patient_id,
            TransactionPayload::ConsentRevocation(e) => &e.patient_id,
            TransactionPayload::AccessLog(e) => &e.patient_id,
        }
    }

    /// True for a consent grant between exactly this doctor and patient
    pub fn is_consent_between(&self, doctor_id: &str, patient_id: &str) -> bool {
        matches!(
            self,
            TransactionPayload::Consent(e) if e.doctor_id == doctor_id && e.patient_id == patient_id
        )
    }
}

/// Immutable ledger event
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub payload: TransactionPayload,
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        self.payload.kind()
    }

    pub fn subject(&self) -> &str {
        self.payload.subject()
    }
}
