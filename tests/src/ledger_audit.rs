//! Ledger Audit Tests
//!
//! History ordering across sealed and pending transactions, chain linkage,
//! tamper detection and snapshot restore.

#[cfg(test)]
mod tests {
    use crate::harness::*;
    use chrono::Duration;
    use std::collections::BTreeMap;
    use swasthya_ledger::{
        Block, ChainError, Ledger, LedgerBackend, MemoryBackend, TransactionKind,
        TransactionPayload, GENESIS_PREVIOUS_HASH,
    };
    use swasthya_shared::{Action, LedgerConfig, Principal, SwasthyaConfig};

    #[test]
    fn test_full_patient_history() {
        let p = Platform::new();
        let mut metadata = BTreeMap::new();
        metadata.insert("record_type".to_string(), "prescription".to_string());
        p.ledger
            .record_medical_data(PATIENT, "9f2c", "QmPrescription", metadata);

        let grant = p.approved(DOCTOR, 24);
        p.ledger.seal_block(2);

        p.clock.advance(Duration::minutes(10));
        p.authorizer
            .authorize_record(&Principal::doctor(DOCTOR), PATIENT, "rec-1", Action::View);
        p.consent.revoke(&grant.id, PATIENT).unwrap();

        let history = p.ledger.history(PATIENT);
        let summary: Vec<_> = history.iter().map(|h| (h.block_index, h.kind)).collect();
        assert_eq!(
            summary,
            vec![
                (Some(2), TransactionKind::MedicalRecord),
                (Some(2), TransactionKind::Consent),
                (None, TransactionKind::AccessLog),
                (None, TransactionKind::ConsentRevocation),
            ]
        );
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_history_serializes_with_type_tags() {
        let p = Platform::new();
        p.approved(DOCTOR, 24);

        let json = serde_json::to_value(p.ledger.history(PATIENT)).unwrap();
        assert_eq!(json[0]["kind"], "consent");
        assert_eq!(json[0]["payload"]["type"], "consent");
        assert_eq!(json[0]["payload"]["doctor_id"], DOCTOR);
        assert!(json[0]["block_index"].is_null());
    }

    #[test]
    fn test_chain_links_through_seals() {
        let p = Platform::new();
        let genesis = p.ledger.last_block().unwrap();
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(genesis.index, 1);

        p.approved(DOCTOR, 24);
        let second = p.ledger.seal_block(11);
        let third = p.ledger.seal_block(12);

        assert_eq!(second.previous_hash, Ledger::hash_block(&genesis));
        assert_eq!(third.previous_hash, Ledger::hash_block(&second));
        assert!(third.transactions.is_empty());
        assert!(p.ledger.verify_chain().is_ok());

        let hash = Ledger::hash_block(&second);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_snapshot_restore_keeps_history() {
        let p = Platform::new();
        p.approved(DOCTOR, 24);
        p.ledger.seal_block(5);

        let json = serde_json::to_string(&p.ledger.chain()).unwrap();
        let blocks: Vec<Block> = serde_json::from_str(&json).unwrap();
        let restored = Ledger::with_backend(
            Box::new(MemoryBackend::from_blocks(blocks)),
            LedgerConfig::default(),
            p.clock.clone(),
        );

        assert_eq!(restored.block_count(), 2);
        assert!(restored.verify(DOCTOR, PATIENT));
        assert!(restored.verify_chain().is_ok());
    }

    #[test]
    fn test_rewritten_history_is_detected() {
        let p = Platform::new();
        p.approved(DOCTOR, 24);
        p.ledger.seal_block(2);
        p.ledger.seal_block(3);

        let mut backend = MemoryBackend::new();
        for mut block in p.ledger.chain() {
            for tx in block.transactions.iter_mut() {
                if let TransactionPayload::Consent(entry) = &mut tx.payload {
                    entry.duration_hours = 720;
                }
            }
            backend.push(block);
        }
        assert_eq!(backend.len(), 3);

        let restored = Ledger::with_backend(Box::new(backend), LedgerConfig::default(), p.clock.clone());
        assert!(matches!(
            restored.verify_chain(),
            Err(ChainError::BrokenLink { index: 3, .. })
        ));
    }

    #[test]
    fn test_auto_seal_from_env_style_config() {
        let config = SwasthyaConfig::from_lookup(|key| match key {
            "SWASTHYA_AUTO_SEAL_AFTER" => Some("2".to_string()),
            "SWASTHYA_DEFAULT_PROOF" => Some("99".to_string()),
            _ => None,
        })
        .unwrap();
        let p = Platform::with_config(config);

        p.approved(DOCTOR, 24);
        assert_eq!(p.ledger.pending_count(), 1);
        p.authorizer
            .authorize(&Principal::doctor(DOCTOR), PATIENT, Action::View);

        assert_eq!(p.ledger.pending_count(), 0);
        let block = p.ledger.last_block().unwrap();
        assert_eq!(block.proof, 99);
        assert_eq!(block.transactions.len(), 2);
    }
}
