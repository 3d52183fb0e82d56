//! Smoke Screen Unit tests for the approval workflow components
//!
//! These tests span the public API of each module in isolation from the
//! integration scenarios. They are intended as a smoke screen and mostly
//! cover the happy path.

use chrono::{Datelike, Timelike, Utc};
use procurement_approval::{
    authorization::{AllowAll, ApproverRoster, TierAuthorizer},
    config::{LogFormat, WorkflowConfig},
    draft::{ApprovableDraft, PurchaseOrderDraft, ServiceRequisitionDraft},
    error::WorkflowError,
    money::Money,
    record::{ApprovableRecord, RecordKind, TimeStamp},
    state_machine::{EventKind, Status},
    store::{ApprovalStore, MemoryStore},
    threshold::{ThresholdPolicy, Tier},
    utils::new_uuid_to_bech32,
    variance::variance,
};
use rust_decimal::Decimal;

fn draft_record(id: &str) -> ApprovableRecord {
    let validated = PurchaseOrderDraft::new()
        .set_title("Filters")
        .add_line_item("filter", 4, Decimal::from(25))
        .validate_and_finalise()
        .unwrap();
    ApprovableRecord::draft(
        id.to_string(),
        validated.title,
        validated.document,
        "tech-1".to_string(),
        None,
    )
    .unwrap()
}

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Ids are bech32 with the requested prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("po_").unwrap();
        assert!(encoded.starts_with("po_1"));
        assert!(encoded.len() > 10);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("sr_").unwrap();
        let id2 = new_uuid_to_bech32("sr_").unwrap();
        assert_ne!(id1, id2);
    }
}

// RECORD MODULE TESTS
mod record_tests {
    use super::*;

    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    #[test]
    fn timestamp_new_with_creates_specific_time() {
        let dt = TimeStamp::new_with(2024, 6, 15, 10, 30, 0)
            .unwrap()
            .to_datetime_utc();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 6);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn timestamp_new_with_rejects_impossible_dates() {
        assert!(TimeStamp::new_with(2024, 2, 30, 0, 0, 0).is_none());
    }

    #[test]
    fn numbers_are_zero_padded() {
        assert_eq!(RecordKind::PurchaseOrder.format_number(1), "PO-0001");
        assert_eq!(RecordKind::ServiceRequisition.format_number(12_345), "SR-12345");
    }

    #[test]
    fn submitted_document_hash_detects_edits() {
        let mut record = draft_record("po_hash");
        record.details_hash = Some(record.document.digest().unwrap());
        assert!(record.details_unchanged().unwrap());

        if let procurement_approval::record::Document::PurchaseOrder(po) = &mut record.document {
            po.tax = Money::whole(1);
        }
        assert!(!record.details_unchanged().unwrap());
    }
}

// THRESHOLD AND VARIANCE TESTS
mod policy_tests {
    use super::*;

    #[test]
    fn default_config_builds_a_policy() {
        let policy = WorkflowConfig::default().threshold_policy().unwrap();
        assert_eq!(policy.tier2_threshold(), Money::whole(5_000));
        assert_eq!(policy.tier3_threshold(), Money::whole(25_000));
        assert_eq!(WorkflowConfig::default().logging.format, LogFormat::Compact);
    }

    #[test]
    fn required_tiers_examples() {
        let policy = ThresholdPolicy::new(Money::whole(1_000), Money::whole(10_000)).unwrap();
        assert!(policy.required_tiers(Money::ZERO).is_empty());
        assert_eq!(policy.required_tiers(Money::whole(1_000)), vec![Tier::Tier2]);
        assert_eq!(
            policy.required_tiers(Money::MAX),
            vec![Tier::Tier2, Tier::Tier3]
        );
    }

    #[test]
    fn variance_examples() {
        let v = variance(Money::whole(1_000), Money::whole(1_150));
        assert_eq!(v.percent.value(), Decimal::from(15));
        assert!(v.requires_justification);
        assert_eq!(v.percent.to_string(), "15%");
    }
}

// AUTHORIZATION TESTS
mod authorization_tests {
    use super::*;

    #[test]
    fn allow_all_allows_everyone() {
        assert!(AllowAll.is_authorized("anyone", Tier::Tier3));
    }

    #[test]
    fn roster_trims_actor_ids() {
        let roster = ApproverRoster::new().grant(" mgr-1 ", Tier::Tier2);
        assert_eq!(roster.highest_tier("mgr-1"), Some(Tier::Tier2));
    }
}

// DRAFT TESTS
mod draft_tests {
    use super::*;

    #[test]
    fn drafts_know_their_kind() {
        let po: ApprovableDraft = PurchaseOrderDraft::new().into();
        let sr: ApprovableDraft = ServiceRequisitionDraft::new().into();
        assert_eq!(po.kind(), RecordKind::PurchaseOrder);
        assert_eq!(sr.kind(), RecordKind::ServiceRequisition);
    }

    #[test]
    fn sub_cent_prices_are_refused() {
        let result = PurchaseOrderDraft::new()
            .set_title("Screws")
            .add_line_item("screw", 1000, Decimal::new(1, 3))
            .validate_and_finalise();
        assert!(result.is_err());
    }
}

// MEMORY STORE TESTS
mod store_tests {
    use super::*;

    #[test]
    fn duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        let record = draft_record("po_dup");
        store.insert(&record).unwrap();
        assert!(matches!(
            store.insert(&record),
            Err(WorkflowError::Conflict { .. })
        ));
    }

    #[test]
    fn save_requires_the_preceding_version() {
        let store = MemoryStore::new();
        let record = draft_record("po_cas");
        store.insert(&record).unwrap();

        let mut next = record.clone();
        next.version += 2;
        assert!(matches!(
            store.save(&next, Status::Draft),
            Err(WorkflowError::Conflict { .. })
        ));

        next.version = record.version + 1;
        assert!(matches!(
            store.save(&next, Status::PendingTier2),
            Err(WorkflowError::Conflict { .. })
        ));
        assert!(store.save(&next, Status::Draft).is_ok());
    }

    #[test]
    fn save_of_unknown_record_is_not_found() {
        let store = MemoryStore::new();
        let record = draft_record("po_ghost");
        assert!(matches!(
            store.save(&record, Status::Draft),
            Err(WorkflowError::NotFound { .. })
        ));
    }

    #[test]
    fn sequences_count_per_kind() {
        let store = MemoryStore::new();
        assert_eq!(store.next_number(RecordKind::PurchaseOrder).unwrap(), 1);
        assert_eq!(store.next_number(RecordKind::PurchaseOrder).unwrap(), 2);
        assert_eq!(store.next_number(RecordKind::ServiceRequisition).unwrap(), 1);
    }
}

// ERROR TESTS
mod error_tests {
    use super::*;

    #[test]
    fn messages_name_event_and_status() {
        let err = WorkflowError::InvalidTransition {
            event: EventKind::Close,
            status: Status::PendingTier2,
        };
        assert_eq!(err.to_string(), "cannot close a record that is pending_tier2");
        assert!(err.is_invalid_transition());
        assert!(!WorkflowError::NotFound { id: "x".into() }.is_invalid_transition());
    }
}
