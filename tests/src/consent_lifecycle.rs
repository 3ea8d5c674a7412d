//! Consent Lifecycle Tests
//!
//! Request, approval, denial, revocation and expiry as seen by patients,
//! doctors and the ledger.

#[cfg(test)]
mod tests {
    use crate::harness::*;
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;
    use swasthya_consent::{ConsentRequest, ConsentStatus};
    use swasthya_ledger::{TransactionKind, TransactionPayload};
    use swasthya_shared::{AccessType, Clock, HealthError, Role, SwasthyaConfig};

    #[test]
    fn test_request_approve_use_and_revoke() {
        let p = Platform::new();
        let grant = p.request(DOCTOR, 24);
        assert_eq!(p.consent.list_pending(PATIENT).len(), 1);

        let approved = p.consent.approve(&grant.id, PATIENT).unwrap();
        assert_eq!(approved.expires_at, Some(t0() + Duration::hours(24)));
        assert!(p.consent.list_pending(PATIENT).is_empty());
        assert!(p.consent.is_active(PATIENT, DOCTOR, t0() + Duration::hours(1)));

        p.clock.advance(Duration::hours(1));
        p.consent.revoke(&grant.id, PATIENT).unwrap();
        assert!(!p.consent.is_active(PATIENT, DOCTOR, t0() + Duration::hours(2)));

        let history = p.ledger.history(PATIENT);
        let kinds: Vec<_> = history.iter().map(|h| h.kind).collect();
        assert_eq!(kinds, vec![TransactionKind::Consent, TransactionKind::ConsentRevocation]);
        assert_eq!(history[0].transaction_id, approved.blockchain_tx_id);

        match &history[1].payload {
            TransactionPayload::ConsentRevocation(entry) => {
                assert_eq!(entry.grant_id, grant.id);
                assert_eq!(entry.revoked_at, t0() + Duration::hours(1));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_legacy_verify_ignores_revocation() {
        let p = Platform::new();
        let grant = p.approved(DOCTOR, 24);
        p.consent.revoke(&grant.id, PATIENT).unwrap();

        assert!(p.ledger.verify(DOCTOR, PATIENT));
        assert!(!p.consent.is_active(PATIENT, DOCTOR, p.clock.now()));
    }

    #[test]
    fn test_consent_entry_mirrors_grant() {
        let p = Platform::new();
        let grant = p
            .consent
            .request(ConsentRequest {
                doctor_id: DOCTOR.to_string(),
                patient_email: PATIENT_EMAIL.to_string(),
                access_type: AccessType::Full,
                duration_hours: 72,
                reason: "surgery planning".to_string(),
                record_ids: Some(vec!["rec-2".to_string(), "rec-1".to_string()]),
            })
            .unwrap();
        let approved = p.consent.approve(&grant.id, PATIENT).unwrap();

        let txs = p.ledger.transactions_for_subject(PATIENT);
        match &txs[0].payload {
            TransactionPayload::Consent(entry) => {
                assert_eq!(entry.grant_id, approved.id);
                assert_eq!(entry.doctor_id, DOCTOR);
                assert_eq!(entry.access_type, AccessType::Full);
                assert_eq!(entry.duration_hours, 72);
                let ids: Vec<_> = entry.record_ids.iter().flatten().cloned().collect();
                assert_eq!(ids, vec!["rec-1", "rec-2"]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_request_for_doctor_email_is_not_found() {
        let p = Platform::new();
        let result = p.consent.request(ConsentRequest {
            doctor_id: DOCTOR.to_string(),
            patient_email: DOCTOR_EMAIL.to_string(),
            access_type: AccessType::Read,
            duration_hours: 24,
            reason: "treatment".to_string(),
            record_ids: None,
        });
        let err = result.unwrap_err();
        assert!(matches!(err, HealthError::NotFound(_)));
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn test_only_named_patient_may_decide() {
        let p = Platform::new();
        let grant = p.request(DOCTOR, 24);

        for actor in [OTHER_PATIENT, DOCTOR] {
            let err = p.consent.approve(&grant.id, actor).unwrap_err();
            assert_eq!(err.http_status(), 403);
        }
        assert_eq!(p.consent.get(&grant.id).unwrap().status, ConsentStatus::Pending);
    }

    #[test]
    fn test_denied_grant_never_authorizes() {
        let p = Platform::new();
        let grant = p.request(DOCTOR, 24);
        p.consent.deny(&grant.id, PATIENT).unwrap();

        assert!(!p.consent.is_active(PATIENT, DOCTOR, p.clock.now()));
        assert!(p.ledger.transactions_for_subject(PATIENT).is_empty());
        let err = p.consent.approve(&grant.id, PATIENT).unwrap_err();
        assert!(matches!(err, HealthError::InvalidState(_)));
    }

    #[test]
    fn test_expiry_sweep_then_listing() {
        let p = Platform::new();
        let short = p.approved(DOCTOR, 2);
        p.clock.advance(Duration::minutes(5));
        let long = p.approved(DOCTOR, 48);

        p.clock.advance(Duration::hours(3));
        let expired = p.consent.expire_due(p.clock.now());
        assert_eq!(expired, vec![short.id.clone()]);

        let mine = p.consent.list_for(PATIENT, Role::Patient);
        assert_eq!(mine[0].id, long.id);
        assert_eq!(mine[1].status, ConsentStatus::Expired);

        let doctors = p.consent.list_for(DOCTOR, Role::Doctor);
        assert_eq!(doctors.len(), 2);
        assert!(p.consent.list_for(DOCTOR, Role::Admin).is_empty());
    }

    #[test]
    fn test_configured_bounds_apply() {
        let config = SwasthyaConfig::from_json_str(
            r#"{"consent": {"min_duration_hours": 4, "max_duration_hours": 168}}"#,
        )
        .unwrap();
        let p = Platform::with_config(config);

        for hours in [3, 169] {
            let err = p
                .consent
                .request(ConsentRequest {
                    doctor_id: DOCTOR.to_string(),
                    patient_email: PATIENT_EMAIL.to_string(),
                    access_type: AccessType::Read,
                    duration_hours: hours,
                    reason: "treatment".to_string(),
                    record_ids: None,
                })
                .unwrap_err();
            assert!(matches!(err, HealthError::Validation(_)));
        }
        assert_eq!(p.request(DOCTOR, 168).duration_hours, 168);
    }

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Approve,
        Deny,
        Revoke,
        Advance(i64),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Approve),
            Just(Step::Deny),
            Just(Step::Revoke),
            (0i64..30).prop_map(Step::Advance),
        ]
    }

    fn ledger_count(p: &Platform, kind: TransactionKind) -> usize {
        p.ledger
            .transactions_for_subject(PATIENT)
            .iter()
            .filter(|tx| tx.kind() == kind)
            .count()
    }

    proptest! {
        #[test]
        fn prop_any_step_sequence_follows_the_state_machine(
            steps in proptest::collection::vec(step_strategy(), 1..25)
        ) {
            let p = Platform::new();
            let grant = p.request(DOCTOR, 24);

            let mut status = ConsentStatus::Pending;
            let mut expires_at: Option<DateTime<Utc>> = None;

            for step in steps {
                let now = p.clock.now();
                let window_open = expires_at.map_or(false, |exp| now < exp);
                match step {
                    Step::Approve => {
                        let ok = p.consent.approve(&grant.id, PATIENT).is_ok();
                        prop_assert_eq!(ok, status == ConsentStatus::Pending);
                        if ok {
                            status = ConsentStatus::Approved;
                            expires_at = Some(now + Duration::hours(24));
                        }
                    }
                    Step::Deny => {
                        let ok = p.consent.deny(&grant.id, PATIENT).is_ok();
                        prop_assert_eq!(ok, status == ConsentStatus::Pending);
                        if ok {
                            status = ConsentStatus::Denied;
                        }
                    }
                    Step::Revoke => {
                        let ok = p.consent.revoke(&grant.id, PATIENT).is_ok();
                        prop_assert_eq!(ok, status == ConsentStatus::Approved && window_open);
                        if ok {
                            status = ConsentStatus::Revoked;
                        }
                    }
                    Step::Advance(hours) => p.clock.advance(Duration::hours(hours)),
                }

                let now = p.clock.now();
                let expected_active =
                    status == ConsentStatus::Approved && expires_at.map_or(false, |exp| now < exp);
                prop_assert_eq!(p.consent.is_active(PATIENT, DOCTOR, now), expected_active);
            }

            let approvals = usize::from(expires_at.is_some());
            let revocations = usize::from(status == ConsentStatus::Revoked);
            prop_assert_eq!(ledger_count(&p, TransactionKind::Consent), approvals);
            prop_assert_eq!(ledger_count(&p, TransactionKind::ConsentRevocation), revocations);
        }
    }
}
