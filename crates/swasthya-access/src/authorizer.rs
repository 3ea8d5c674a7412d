//! The single access decision procedure for patient records

use crate::relations::RelationshipSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use swasthya_consent::ConsentStore;
use swasthya_ledger::{AccessLogEntry, TransactionId, TransactionLog, TransactionPayload};
use swasthya_shared::{Action, Clock, HealthError, HealthResult, Principal, Role};
use tracing::{debug, warn};

/// Reason attached to every ordinary denial
pub const NO_PERMISSION: &str = "no permission";

/// Which rule allowed an access
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum AccessBasis {
    Owner,
    Admin,
    Appointment,
    Consent { grant_id: String },
    Emergency,
}

impl AccessBasis {
    /// Owner and admin access are not written to the ledger
    pub fn is_audited(&self) -> bool {
        !matches!(self, AccessBasis::Owner | AccessBasis::Admin)
    }
}

/// Outcome of an authorization check. A denial is a value, not an error.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow {
        basis: AccessBasis,
        /// Id of the `access_log` transaction, for audited paths
        audit_tx_id: Option<TransactionId>,
    },
    Deny {
        reason: String,
    },
}

impl Decision {
    fn deny(reason: &str) -> Self {
        Decision::Deny {
            reason: reason.to_string(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn basis(&self) -> Option<&AccessBasis> {
        match self {
            Decision::Allow { basis, .. } => Some(basis),
            Decision::Deny { .. } => None,
        }
    }

    pub fn audit_tx_id(&self) -> Option<&str> {
        match self {
            Decision::Allow { audit_tx_id, .. } => audit_tx_id.as_deref(),
            Decision::Deny { .. } => None,
        }
    }

    /// For callers that want `?`: a denial becomes [`HealthError::Forbidden`]
    pub fn into_result(self) -> HealthResult<AccessBasis> {
        match self {
            Decision::Allow { basis, .. } => Ok(basis),
            Decision::Deny { reason } => Err(HealthError::Forbidden(reason)),
        }
    }
}

/// Decides whether a principal may act on a patient's records.
///
/// Rules are checked in order and the first match wins:
///
/// 1. the principal is the patient
/// 2. the principal is an admin
/// 3. a doctor with an appointment relation to the patient
/// 4. a doctor holding an active consent grant
///
/// Allows through rules 3 and 4 append exactly one `access_log` transaction.
pub struct Authorizer {
    consent: Arc<ConsentStore>,
    relations: Arc<dyn RelationshipSource>,
    ledger: Arc<dyn TransactionLog>,
    clock: Arc<dyn Clock>,
}

impl Authorizer {
    pub fn new(
        consent: Arc<ConsentStore>,
        relations: Arc<dyn RelationshipSource>,
        ledger: Arc<dyn TransactionLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            consent,
            relations,
            ledger,
            clock,
        }
    }

    /// Authorize an action against the patient's records as a whole.
    ///
    /// The consent path only asks whether the doctor holds an active grant;
    /// record scope and access type are not consulted. Use
    /// [`Authorizer::authorize_record`] when they matter.
    pub fn authorize(&self, principal: &Principal, patient_id: &str, action: Action) -> Decision {
        self.decide(principal, patient_id, None, action)
    }

    /// Authorize an action on one record. The consent path only matches
    /// grants whose scope includes the record and whose access type
    /// permits the action.
    pub fn authorize_record(
        &self,
        principal: &Principal,
        patient_id: &str,
        record_id: &str,
        action: Action,
    ) -> Decision {
        self.decide(principal, patient_id, Some(record_id), action)
    }

    /// Break-glass access for a doctor without a relation or consent.
    /// Always audited with the emergency flag set.
    pub fn authorize_emergency(
        &self,
        principal: &Principal,
        patient_id: &str,
        record_id: Option<&str>,
        action: Action,
        justification: &str,
    ) -> Decision {
        if principal.role != Role::Doctor {
            warn!(
                accessor = %principal.id,
                role = %principal.role,
                patient_id,
                "emergency access refused for non-doctor"
            );
            return Decision::deny("emergency access is limited to doctors");
        }
        if justification.trim().is_empty() {
            warn!(accessor = %principal.id, patient_id, "emergency access without justification");
            return Decision::deny("emergency access requires a justification");
        }

        let tx_id = self.log_access(principal, patient_id, record_id, action, true);
        warn!(
            accessor = %principal.id,
            patient_id,
            action = %action,
            justification,
            tx_id = %tx_id,
            "emergency access granted"
        );
        Decision::Allow {
            basis: AccessBasis::Emergency,
            audit_tx_id: Some(tx_id),
        }
    }

    fn decide(
        &self,
        principal: &Principal,
        patient_id: &str,
        record_id: Option<&str>,
        action: Action,
    ) -> Decision {
        if principal.id == patient_id {
            return self.allow(principal, patient_id, record_id, action, AccessBasis::Owner);
        }
        if principal.role == Role::Admin {
            return self.allow(principal, patient_id, record_id, action, AccessBasis::Admin);
        }

        if principal.role == Role::Doctor {
            if self.relations.has_relation(&principal.id, patient_id) {
                return self.allow(principal, patient_id, record_id, action, AccessBasis::Appointment);
            }

            let now = self.clock.now();
            let grant = match record_id {
                Some(record_id) => {
                    self.consent
                        .covering_grant(patient_id, &principal.id, record_id, action, now)
                }
                None => self.consent.active_grant(patient_id, &principal.id, now),
            };
            if let Some(grant) = grant {
                let basis = AccessBasis::Consent { grant_id: grant.id };
                return self.allow(principal, patient_id, record_id, action, basis);
            }
        }

        warn!(
            accessor = %principal.id,
            role = %principal.role,
            patient_id,
            record_id = ?record_id,
            action = %action,
            "access denied"
        );
        Decision::deny(NO_PERMISSION)
    }

    fn allow(
        &self,
        principal: &Principal,
        patient_id: &str,
        record_id: Option<&str>,
        action: Action,
        basis: AccessBasis,
    ) -> Decision {
        let audit_tx_id = basis
            .is_audited()
            .then(|| self.log_access(principal, patient_id, record_id, action, false));
        debug!(
            accessor = %principal.id,
            patient_id,
            action = %action,
            basis = ?basis,
            "access allowed"
        );
        Decision::Allow { basis, audit_tx_id }
    }

    fn log_access(
        &self,
        principal: &Principal,
        patient_id: &str,
        record_id: Option<&str>,
        action: Action,
        is_emergency: bool,
    ) -> TransactionId {
        self.ledger.append(TransactionPayload::AccessLog(AccessLogEntry {
            patient_id: patient_id.to_string(),
            accessor_id: principal.id.clone(),
            record_id: record_id.map(str::to_string),
            action,
            is_emergency,
            accessed_at: self.clock.now(),
        }))
    }
}
