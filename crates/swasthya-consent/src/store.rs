//! Consent store: owns every grant and its transitions

use crate::directory::UserDirectory;
use crate::grant::{ConsentGrant, ConsentStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use swasthya_ledger::{ConsentEntry, RevocationEntry, TransactionLog, TransactionPayload};
use swasthya_shared::{
    new_id, validate_duration_hours, validate_email, validate_identifier, AccessType, Action,
    Clock, ConsentConfig, HealthError, HealthResult, Role, ValidationErrorCode, ValidationResult,
};
use tracing::{debug, info, warn};

/// A doctor's request for access to a patient's records
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentRequest {
    pub doctor_id: String,
    pub patient_email: String,
    pub access_type: AccessType,
    pub duration_hours: u32,
    pub reason: String,
    pub record_ids: Option<Vec<String>>,
}

/// Grants in insertion order with an id index
#[derive(Default)]
struct GrantTable {
    grants: Vec<ConsentGrant>,
    by_id: HashMap<String, usize>,
}

impl GrantTable {
    fn insert(&mut self, grant: ConsentGrant) {
        self.by_id.insert(grant.id.clone(), self.grants.len());
        self.grants.push(grant);
    }

    fn get(&self, id: &str) -> Option<&ConsentGrant> {
        self.by_id.get(id).map(|&i| &self.grants[i])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut ConsentGrant> {
        match self.by_id.get(id) {
            Some(&i) => self.grants.get_mut(i),
            None => None,
        }
    }

    /// Newest `created_at` first; among equal timestamps, latest inserted first
    fn newest_first<F>(&self, keep: F) -> Vec<ConsentGrant>
    where
        F: Fn(&ConsentGrant) -> bool,
    {
        let mut selected: Vec<ConsentGrant> =
            self.grants.iter().rev().filter(|g| keep(g)).cloned().collect();
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        selected
    }
}

/// Owns the consent grant lifecycle.
///
/// Every transition holds the write lock from the status check through the
/// ledger append and the write, so two transitions on the same grant never
/// interleave and a failed call leaves nothing changed.
pub struct ConsentStore {
    table: RwLock<GrantTable>,
    directory: Arc<dyn UserDirectory>,
    ledger: Arc<dyn TransactionLog>,
    clock: Arc<dyn Clock>,
    config: ConsentConfig,
}

impl ConsentStore {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        ledger: Arc<dyn TransactionLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_config(ConsentConfig::default(), directory, ledger, clock)
    }

    pub fn with_config(
        config: ConsentConfig,
        directory: Arc<dyn UserDirectory>,
        ledger: Arc<dyn TransactionLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            table: RwLock::new(GrantTable::default()),
            directory,
            ledger,
            clock,
            config,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, GrantTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GrantTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate_request(&self, request: &ConsentRequest) -> HealthResult<()> {
        let mut result = ValidationResult::new();
        result.merge(validate_identifier(&request.doctor_id, "doctor_id"));
        result.merge(validate_email(&request.patient_email, "patient_email"));
        result.merge(validate_duration_hours(
            request.duration_hours,
            self.config.min_duration_hours,
            self.config.max_duration_hours,
            "duration_hours",
        ));
        if let Some(ids) = &request.record_ids {
            if ids.is_empty() {
                result.add_error(
                    "record_ids",
                    "Record scope must name at least one record; omit it to cover all records",
                    ValidationErrorCode::Required,
                );
            }
            for id in ids {
                result.merge(validate_identifier(id, "record_ids"));
            }
        }
        result.into_result()
    }

    /// Create a pending grant addressed to the patient registered under
    /// `patient_email`
    pub fn request(&self, request: ConsentRequest) -> HealthResult<ConsentGrant> {
        self.validate_request(&request)?;

        let patient = self
            .directory
            .find_by_email(&request.patient_email)
            .filter(|user| user.role == Role::Patient)
            .ok_or_else(|| {
                HealthError::NotFound(format!("patient with email {}", request.patient_email))
            })?;

        let now = self.clock.now();
        let grant = ConsentGrant {
            id: new_id(),
            doctor_id: request.doctor_id,
            patient_id: patient.id,
            patient_email: request.patient_email,
            access_type: request.access_type,
            duration_hours: request.duration_hours,
            reason: request.reason,
            record_ids: request
                .record_ids
                .map(|ids| ids.into_iter().collect::<BTreeSet<_>>()),
            status: ConsentStatus::Pending,
            blockchain_tx_id: String::new(),
            created_at: now,
            updated_at: now,
            granted_at: None,
            expires_at: None,
        };

        info!(
            grant_id = %grant.id,
            doctor_id = %grant.doctor_id,
            patient_id = %grant.patient_id,
            duration_hours = grant.duration_hours,
            "consent requested"
        );
        self.write().insert(grant.clone());
        Ok(grant)
    }

    /// Look up the grant and check the actor is its patient
    fn owned_by<'a>(
        table: &'a mut GrantTable,
        grant_id: &str,
        acting_patient_id: &str,
    ) -> HealthResult<&'a mut ConsentGrant> {
        let grant = table
            .get_mut(grant_id)
            .ok_or_else(|| HealthError::NotFound(format!("consent grant {}", grant_id)))?;
        if grant.patient_id != acting_patient_id {
            warn!(grant_id, actor = acting_patient_id, "consent mutation by non-owner");
            return Err(HealthError::Forbidden(
                "only the named patient may act on this consent".to_string(),
            ));
        }
        Ok(grant)
    }

    fn require_status(grant: &ConsentGrant, next: ConsentStatus) -> HealthResult<()> {
        if grant.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(HealthError::InvalidState(format!(
                "consent {} is {} and cannot become {}",
                grant.id, grant.status, next
            )))
        }
    }

    /// Approve a pending grant, starting its expiry window and recording a
    /// consent transaction
    pub fn approve(&self, grant_id: &str, acting_patient_id: &str) -> HealthResult<ConsentGrant> {
        let mut table = self.write();
        let grant = Self::owned_by(&mut table, grant_id, acting_patient_id)?;
        Self::require_status(grant, ConsentStatus::Approved)?;

        let now = self.clock.now();
        let tx_id = self.ledger.append(TransactionPayload::Consent(ConsentEntry {
            patient_id: grant.patient_id.clone(),
            doctor_id: grant.doctor_id.clone(),
            grant_id: grant.id.clone(),
            access_type: grant.access_type,
            record_ids: grant.record_ids.clone(),
            duration_hours: grant.duration_hours,
        }));

        grant.status = ConsentStatus::Approved;
        grant.granted_at = Some(now);
        grant.expires_at = Some(now + Duration::hours(i64::from(grant.duration_hours)));
        grant.blockchain_tx_id = tx_id;
        grant.updated_at = now;

        info!(
            grant_id,
            tx_id = %grant.blockchain_tx_id,
            expires_at = ?grant.expires_at,
            "consent approved"
        );
        Ok(grant.clone())
    }

    /// Deny a pending grant. Denials are not written to the ledger.
    pub fn deny(&self, grant_id: &str, acting_patient_id: &str) -> HealthResult<ConsentGrant> {
        let mut table = self.write();
        let grant = Self::owned_by(&mut table, grant_id, acting_patient_id)?;
        Self::require_status(grant, ConsentStatus::Denied)?;

        grant.status = ConsentStatus::Denied;
        grant.updated_at = self.clock.now();

        info!(grant_id, "consent denied");
        Ok(grant.clone())
    }

    /// Revoke an approved, unexpired grant with immediate effect and record
    /// a revocation transaction
    pub fn revoke(&self, grant_id: &str, acting_patient_id: &str) -> HealthResult<()> {
        let mut table = self.write();
        let grant = Self::owned_by(&mut table, grant_id, acting_patient_id)?;
        Self::require_status(grant, ConsentStatus::Revoked)?;

        let now = self.clock.now();
        if grant.is_lapsed_at(now) {
            return Err(HealthError::InvalidState(format!(
                "consent {} has already expired",
                grant.id
            )));
        }

        self.ledger
            .append(TransactionPayload::ConsentRevocation(RevocationEntry {
                patient_id: grant.patient_id.clone(),
                doctor_id: grant.doctor_id.clone(),
                grant_id: grant.id.clone(),
                revoked_at: now,
            }));

        grant.status = ConsentStatus::Revoked;
        grant.updated_at = now;

        info!(grant_id, "consent revoked");
        Ok(())
    }

    /// True iff any grant from the patient to the doctor is approved and
    /// unexpired at `now`
    pub fn is_active(&self, patient_id: &str, doctor_id: &str, now: DateTime<Utc>) -> bool {
        self.read()
            .grants
            .iter()
            .any(|g| g.is_between(patient_id, doctor_id) && g.is_active_at(now))
    }

    /// The active grant for the pair that runs longest, if any
    pub fn active_grant(
        &self,
        patient_id: &str,
        doctor_id: &str,
        now: DateTime<Utc>,
    ) -> Option<ConsentGrant> {
        self.read()
            .grants
            .iter()
            .filter(|g| g.is_between(patient_id, doctor_id) && g.is_active_at(now))
            .max_by_key(|g| g.expires_at)
            .cloned()
    }

    /// An active grant for the pair whose record scope includes `record_id`
    /// and whose access type permits `action`
    pub fn covering_grant(
        &self,
        patient_id: &str,
        doctor_id: &str,
        record_id: &str,
        action: Action,
        now: DateTime<Utc>,
    ) -> Option<ConsentGrant> {
        self.read()
            .grants
            .iter()
            .filter(|g| g.is_between(patient_id, doctor_id) && g.is_active_at(now))
            .filter(|g| g.covers_record(record_id) && g.permits(action))
            .max_by_key(|g| g.expires_at)
            .cloned()
    }

    pub fn get(&self, grant_id: &str) -> HealthResult<ConsentGrant> {
        self.read()
            .get(grant_id)
            .cloned()
            .ok_or_else(|| HealthError::NotFound(format!("consent grant {}", grant_id)))
    }

    /// Requests still awaiting the patient's decision
    pub fn list_pending(&self, patient_id: &str) -> Vec<ConsentGrant> {
        self.read()
            .newest_first(|g| g.patient_id == patient_id && g.status == ConsentStatus::Pending)
    }

    /// Grants visible to a user: patients see grants naming them, doctors
    /// see grants they requested, everyone else sees none
    pub fn list_for(&self, user_id: &str, role: Role) -> Vec<ConsentGrant> {
        match role {
            Role::Patient => self.read().newest_first(|g| g.patient_id == user_id),
            Role::Doctor => self.read().newest_first(|g| g.doctor_id == user_id),
            _ => Vec::new(),
        }
    }

    /// Mark approved grants whose window has closed as expired, returning
    /// their ids
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut table = self.write();
        let mut expired = Vec::new();
        for grant in table.grants.iter_mut().filter(|g| g.is_lapsed_at(now)) {
            grant.status = ConsentStatus::Expired;
            grant.updated_at = now;
            expired.push(grant.id.clone());
        }

        if expired.is_empty() {
            debug!("no consents due for expiry");
        } else {
            info!(count = expired.len(), "expired consents");
        }
        expired
    }
}
