//! Consent grant entity and its status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use swasthya_shared::{AccessType, Action};

/// Lifecycle status of a consent grant.
///
/// `pending → approved | denied`, `approved → revoked | expired`.
/// `denied`, `revoked` and `expired` are terminal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Approved,
    Denied,
    Revoked,
    Expired,
}

impl ConsentStatus {
    pub fn can_transition_to(&self, next: ConsentStatus) -> bool {
        use ConsentStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Denied) | (Approved, Revoked) | (Approved, Expired)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConsentStatus::Denied | ConsentStatus::Revoked | ConsentStatus::Expired
        )
    }
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsentStatus::Pending => write!(f, "pending"),
            ConsentStatus::Approved => write!(f, "approved"),
            ConsentStatus::Denied => write!(f, "denied"),
            ConsentStatus::Revoked => write!(f, "revoked"),
            ConsentStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A doctor's request for access, and once approved, the patient's
/// time-bounded authorization
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentGrant {
    pub id: String,
    pub doctor_id: String,
    pub patient_id: String,
    pub patient_email: String,
    pub access_type: AccessType,
    pub duration_hours: u32,
    pub reason: String,
    /// Restricts the grant to these records; `None` covers all records
    pub record_ids: Option<BTreeSet<String>>,
    pub status: ConsentStatus,
    /// Id of the ledger transaction recording the approval, empty until then
    pub blockchain_tx_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub granted_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConsentGrant {
    /// Approved and not yet past its expiry at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Approved && self.expires_at.is_some_and(|exp| now < exp)
    }

    /// Approved but the window has closed; expiry is implicit until swept
    pub fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Approved && self.expires_at.is_some_and(|exp| now >= exp)
    }

    pub fn covers_record(&self, record_id: &str) -> bool {
        self.record_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(record_id))
    }

    pub fn permits(&self, action: Action) -> bool {
        self.access_type.permits(action)
    }

    pub fn is_between(&self, patient_id: &str, doctor_id: &str) -> bool {
        self.patient_id == patient_id && self.doctor_id == doctor_id
    }
}
