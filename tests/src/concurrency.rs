//! Concurrency Tests
//!
//! Racing transitions on one grant, concurrent authorizations against a
//! revoking patient, and append storms across seals.

#[cfg(test)]
mod tests {
    use crate::harness::*;
    use rand::seq::SliceRandom;
    use std::collections::HashSet;
    use std::sync::Arc;
    use swasthya_consent::ConsentStatus;
    use swasthya_ledger::TransactionKind;
    use swasthya_shared::{Action, Principal};

    #[test]
    fn test_approve_and_deny_race_has_one_winner() {
        for _ in 0..20 {
            let p = Platform::new();
            let grant = p.request(DOCTOR, 24);

            let mut ops: Vec<bool> = (0..6).map(|i| i % 2 == 0).collect();
            ops.shuffle(&mut rand::thread_rng());

            let wins = std::thread::scope(|s| {
                let handles: Vec<_> = ops
                    .iter()
                    .map(|&approve| {
                        let consent = p.consent.clone();
                        let id = grant.id.clone();
                        s.spawn(move || {
                            if approve {
                                consent.approve(&id, PATIENT).is_ok()
                            } else {
                                consent.deny(&id, PATIENT).is_ok()
                            }
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or(false))
                    .filter(|won| *won)
                    .count()
            });
            assert_eq!(wins, 1);

            let status = p.consent.get(&grant.id).unwrap().status;
            let consents = p
                .ledger
                .transactions_for_subject(PATIENT)
                .iter()
                .filter(|tx| tx.kind() == TransactionKind::Consent)
                .count();
            match status {
                ConsentStatus::Approved => assert_eq!(consents, 1),
                ConsentStatus::Denied => assert_eq!(consents, 0),
                other => panic!("unexpected status {}", other),
            }
        }
    }

    #[test]
    fn test_authorizations_during_revoke_are_all_audited() {
        let p = Arc::new(Platform::new());
        let grant = p.approved(DOCTOR, 24);

        let allowed = std::thread::scope(|s| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let p = p.clone();
                    s.spawn(move || {
                        let doctor = Principal::doctor(DOCTOR);
                        (0..50)
                            .filter(|_| p.authorizer.authorize(&doctor, PATIENT, Action::View).is_allowed())
                            .count()
                    })
                })
                .collect();

            let revoker = p.clone();
            let grant_id = grant.id.clone();
            s.spawn(move || revoker.consent.revoke(&grant_id, PATIENT));

            readers
                .into_iter()
                .map(|h| h.join().unwrap_or(0))
                .sum::<usize>()
        });

        assert_eq!(p.access_logs(PATIENT).len(), allowed);
        assert!(!p
            .authorizer
            .authorize(&Principal::doctor(DOCTOR), PATIENT, Action::View)
            .is_allowed());
    }

    #[test]
    fn test_append_storm_across_seals_loses_nothing() {
        let p = Arc::new(Platform::new());
        p.appointments.book(DOCTOR, PATIENT, t0()).unwrap();

        let ids = std::thread::scope(|s| {
            let workers: Vec<_> = (0..6)
                .map(|t| {
                    let p = p.clone();
                    s.spawn(move || {
                        let doctor = Principal::doctor(DOCTOR);
                        let mut ids = Vec::new();
                        for i in 0..40 {
                            let decision = p.authorizer.authorize(&doctor, PATIENT, Action::View);
                            if let Some(id) = decision.audit_tx_id() {
                                ids.push(id.to_string());
                            }
                            if (i + t) % 9 == 0 {
                                p.ledger.seal_block(i as u64);
                            }
                        }
                        ids
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_default())
                .collect::<Vec<_>>()
        });

        assert_eq!(ids.len(), 240);
        let logged: HashSet<String> = p
            .ledger
            .transactions_for_subject(PATIENT)
            .into_iter()
            .map(|tx| tx.id)
            .collect();
        assert_eq!(logged.len(), 240);
        assert!(ids.iter().all(|id| logged.contains(id)));
        assert!(p.ledger.verify_chain().is_ok());
    }
}
