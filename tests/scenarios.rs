use procurement_approval::{
    authorization::{AllowAll, ApproverRoster},
    draft::{PurchaseOrderDraft, ServiceRequisitionDraft},
    error::{ValidationError, WorkflowError},
    money::Money,
    record::{AuditAction, Document},
    service::ApprovalCoordinator,
    sled_store::SledStore,
    state_machine::Status,
    threshold::{ThresholdPolicy, Tier},
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

// Sled locks its directory, so every test opens its own database under a
// temp dir that is removed when the returned guard drops.
fn open_store(name: &str) -> anyhow::Result<(TempDir, Arc<SledStore>)> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join(name))?;
    Ok((temp_dir, Arc::new(store)))
}

fn policy() -> ThresholdPolicy {
    ThresholdPolicy::new(Money::whole(5_000), Money::whole(25_000)).expect("valid thresholds")
}

fn order(title: &str, unit_price: i64) -> PurchaseOrderDraft {
    PurchaseOrderDraft::new()
        .set_title(title)
        .add_line_item("equipment", 1, Decimal::from(unit_price))
}

#[test]
fn small_order_is_approved_on_creation() -> anyhow::Result<()> {
    let (_dir, store) = open_store("small_order.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(order("Light bulbs", 120), "tech-1")?;

    assert_eq!(record.status, Status::Approved);
    assert!(record.required_tiers.is_empty());
    assert!(record.auto_approved_at.is_some());
    assert_eq!(record.number, "PO-0001");
    assert_eq!(service.get(&record.id)?, record);

    Ok(())
}

#[test]
fn tier2_order_needs_one_approval() -> anyhow::Result<()> {
    let (_dir, store) = open_store("tier2_order.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(order("Pump", 5_000), "tech-1")?;
    assert_eq!(record.status, Status::PendingTier2);
    assert_eq!(record.required_tiers, vec![Tier::Tier2]);
    assert_eq!(record.current_tier, Some(Tier::Tier2));

    let record = service.approve(&record.id, "mgr-1")?;
    assert_eq!(record.status, Status::Approved);
    assert_eq!(record.current_tier, None);
    assert_eq!(
        record.tier2_approval.as_ref().map(|s| s.by.as_str()),
        Some("mgr-1")
    );
    // pending_tier3 is never visited
    assert!(!record.history.iter().any(|entry| matches!(
        entry.action,
        AuditAction::Approved { tier: Tier::Tier3 }
    )));

    Ok(())
}

#[test]
fn tier3_order_needs_both_approvals_in_order() -> anyhow::Result<()> {
    let (_dir, store) = open_store("tier3_order.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(order("Chiller", 40_000), "tech-1")?;
    assert_eq!(record.required_tiers, vec![Tier::Tier2, Tier::Tier3]);

    let record = service.approve(&record.id, "mgr-1")?;
    assert_eq!(record.status, Status::PendingTier3);

    let record = service.approve(&record.id, "owner")?;
    assert_eq!(record.status, Status::Approved);
    assert!(record.tier2_approval.is_some());
    assert!(record.tier3_approval.is_some());
    assert!(record.check_invariants().is_ok());
    assert!(record.details_unchanged()?);

    Ok(())
}

#[test]
fn second_approval_is_already_processed() -> anyhow::Result<()> {
    let (_dir, store) = open_store("double_approve.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(order("Pump", 6_000), "tech-1")?;
    let approved = service.approve(&record.id, "mgr-1")?;

    let err = service.approve(&record.id, "mgr-2").unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyProcessed { .. }));
    assert_eq!(service.get(&record.id)?, approved);

    Ok(())
}

#[test]
fn blank_rejection_reason_changes_nothing() -> anyhow::Result<()> {
    let (_dir, store) = open_store("blank_reason.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(order("Pump", 6_000), "tech-1")?;
    let err = service.reject(&record.id, "mgr-1", " \t").unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::EmptyReason)
    ));
    assert_eq!(service.get(&record.id)?.status, Status::PendingTier2);

    Ok(())
}

#[test]
fn rejection_is_final_and_corrections_reference_it() -> anyhow::Result<()> {
    let (_dir, store) = open_store("rejection.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(order("Chiller", 40_000), "tech-1")?;
    let record = service.approve(&record.id, "mgr-1")?;
    let rejected = service.reject(&record.id, "owner", "get a second quote")?;

    assert_eq!(rejected.status, Status::Rejected);
    let rejection = rejected.rejection.as_ref().expect("rejection recorded");
    assert_eq!(rejection.tier, Tier::Tier3);
    assert_eq!(rejection.reason, "get a second quote");

    assert!(matches!(
        service.approve(&rejected.id, "owner"),
        Err(WorkflowError::AlreadyProcessed { .. })
    ));
    assert!(matches!(
        service.submit(&rejected.id, "tech-1"),
        Err(WorkflowError::AlreadyProcessed { .. })
    ));

    let correction =
        service.create_correction(&rejected.id, order("Chiller, second quote", 38_000), "tech-1")?;
    assert_eq!(correction.supersedes.as_deref(), Some(rejected.id.as_str()));
    assert_eq!(correction.status, Status::PendingTier2);
    assert_eq!(correction.number, "PO-0002");

    Ok(())
}

#[test]
fn pending_records_cannot_be_superseded() -> anyhow::Result<()> {
    let (_dir, store) = open_store("supersede_pending.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(order("Pump", 6_000), "tech-1")?;
    let err = service
        .create_correction(&record.id, order("Pump", 5_500), "tech-1")
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::NotSupersedable { .. })
    ));

    Ok(())
}

#[test]
fn requisition_over_variance_needs_justification() -> anyhow::Result<()> {
    let (_dir, store) = open_store("requisition.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let unjustified = ServiceRequisitionDraft::new()
        .set_title("Roof repair")
        .set_original_estimate(Decimal::from(1_000))
        .set_invoice_amount(Decimal::from(1_150));

    let err = service
        .create_approvable(unjustified.clone(), "tech-1")
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::MissingJustification { .. })
    ));
    assert!(service.list(&[])?.is_empty());

    let record = service.create_approvable(
        unjustified.set_justification("storm damage found during repair"),
        "tech-1",
    )?;
    assert_eq!(record.number, "SR-0001");
    assert_eq!(record.status, Status::Approved);

    let Document::ServiceRequisition(sr) = &record.document else {
        panic!("expected a service requisition");
    };
    assert_eq!(sr.variance.delta, 15_000);
    assert_eq!(sr.variance.percent.value(), Decimal::from(15));
    assert!(sr.variance.requires_justification);

    Ok(())
}

#[test]
fn requisition_is_routed_on_invoice_amount() -> anyhow::Result<()> {
    let (_dir, store) = open_store("requisition_routing.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(
        ServiceRequisitionDraft::new()
            .set_title("Elevator service")
            .set_original_estimate(Decimal::from(5_000))
            .set_invoice_amount(Decimal::from(5_100)),
        "tech-1",
    )?;

    assert_eq!(record.status, Status::PendingTier2);
    assert_eq!(record.required_tiers, vec![Tier::Tier2]);

    Ok(())
}

#[test]
fn drafts_can_be_revised_until_submitted() -> anyhow::Result<()> {
    let (_dir, store) = open_store("drafts.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let draft = service.create_draft(order("Generator", 3_000), "tech-1")?;
    assert_eq!(draft.status, Status::Draft);

    let revised = service.update_draft(&draft.id, order("Generator, larger", 30_000), "tech-1")?;
    assert_eq!(revised.title, "Generator, larger");
    assert_eq!(revised.version, draft.version + 1);

    let submitted = service.submit(&draft.id, "tech-1")?;
    assert_eq!(submitted.required_tiers, vec![Tier::Tier2, Tier::Tier3]);

    let err = service
        .update_draft(&draft.id, order("Generator", 100), "tech-1")
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert_eq!(
        service.get(&draft.id)?.triggering_amount(),
        Money::whole(30_000)
    );

    Ok(())
}

#[test]
fn deciding_on_a_draft_is_already_processed() -> anyhow::Result<()> {
    let (_dir, store) = open_store("draft_approve.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let draft = service.create_draft(order("Generator", 9_000), "tech-1")?;
    let err = service.approve(&draft.id, "mgr-1").unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::AlreadyProcessed {
            status: Status::Draft,
            ..
        }
    ));
    assert!(err.is_invalid_transition());

    assert!(matches!(
        service.reject(&draft.id, "mgr-1", "not yet"),
        Err(WorkflowError::AlreadyProcessed { .. })
    ));
    assert!(matches!(
        service.close(&draft.id, "mgr-1"),
        Err(WorkflowError::InvalidTransition { .. })
    ));
    assert_eq!(service.get(&draft.id)?, draft);

    Ok(())
}

#[test]
fn approved_records_can_be_closed_once() -> anyhow::Result<()> {
    let (_dir, store) = open_store("close.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    let record = service.create_approvable(order("Mops", 80), "tech-1")?;
    let closed = service.close(&record.id, "clerk")?;
    assert_eq!(closed.status, Status::Closed);
    assert_eq!(closed.closed.as_ref().map(|s| s.by.as_str()), Some("clerk"));

    assert!(matches!(
        service.close(&record.id, "clerk"),
        Err(WorkflowError::AlreadyProcessed { .. })
    ));

    Ok(())
}

#[test]
fn unknown_record_is_not_found() -> anyhow::Result<()> {
    let (_dir, store) = open_store("not_found.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    assert!(matches!(
        service.approve("po_1missing", "mgr-1"),
        Err(WorkflowError::NotFound { .. })
    ));
    assert!(matches!(
        service.reject("po_1missing", "mgr-1", "no"),
        Err(WorkflowError::NotFound { .. })
    ));

    Ok(())
}

#[test]
fn roster_limits_who_signs_each_tier() -> anyhow::Result<()> {
    let (_dir, store) = open_store("roster.db")?;
    let roster = ApproverRoster::new()
        .grant("mgr-1", Tier::Tier2)
        .grant("owner", Tier::Tier3);
    let service = ApprovalCoordinator::new(store, roster, policy());

    let small = service.create_approvable(order("Pump", 6_000), "tech-1")?;
    let large = service.create_approvable(order("Chiller", 40_000), "tech-1")?;

    assert!(matches!(
        service.approve(&small.id, "tech-1"),
        Err(WorkflowError::Unauthorized { .. })
    ));
    assert_eq!(service.pending_for("mgr-1")?.len(), 2);
    assert!(service.pending_for("tech-1")?.is_empty());

    service.approve(&large.id, "mgr-1")?;
    let err = service.approve(&large.id, "mgr-1").unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Unauthorized {
            tier: Tier::Tier3,
            ..
        }
    ));

    let for_owner = service.pending_for("owner")?;
    assert_eq!(for_owner.len(), 2);
    let for_manager = service.pending_for("mgr-1")?;
    assert_eq!(for_manager.len(), 1);
    assert_eq!(for_manager[0].id, small.id);

    Ok(())
}

#[test]
fn roster_limits_who_rejects_each_tier() -> anyhow::Result<()> {
    let (_dir, store) = open_store("roster_reject.db")?;
    let roster = ApproverRoster::new()
        .grant("mgr-1", Tier::Tier2)
        .grant("owner", Tier::Tier3);
    let service = ApprovalCoordinator::new(store, roster, policy());

    let record = service.create_approvable(order("Chiller", 40_000), "tech-1")?;
    let record = service.approve(&record.id, "mgr-1")?;
    assert_eq!(record.status, Status::PendingTier3);

    for actor in ["stranger", "tech-1", "mgr-1"] {
        let err = service
            .reject(&record.id, actor, "over budget")
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Unauthorized {
                tier: Tier::Tier3,
                ..
            }
        ));
    }
    assert_eq!(service.get(&record.id)?, record);

    let rejected = service.reject(&record.id, "owner", "over budget")?;
    assert_eq!(rejected.status, Status::Rejected);

    Ok(())
}

#[test]
fn list_filters_on_status() -> anyhow::Result<()> {
    let (_dir, store) = open_store("list.db")?;
    let service = ApprovalCoordinator::new(store, AllowAll, policy());

    service.create_approvable(order("Mops", 80), "tech-1")?;
    service.create_approvable(order("Pump", 6_000), "tech-1")?;
    service.create_draft(order("Generator", 9_000), "tech-1")?;

    assert_eq!(service.list(&[])?.len(), 3);
    assert_eq!(service.list(&[Status::Approved])?.len(), 1);
    assert_eq!(service.list(&Status::PENDING)?.len(), 1);
    assert_eq!(service.list(&[Status::Draft, Status::Approved])?.len(), 2);
    assert!(service.list(&[Status::Rejected])?.is_empty());

    Ok(())
}

#[test]
fn tiers_stay_frozen_when_thresholds_change() -> anyhow::Result<()> {
    let (_dir, store) = open_store("frozen.db")?;

    let record = {
        let service = ApprovalCoordinator::new(store.clone(), AllowAll, policy());
        service.create_approvable(order("Chiller", 30_000), "tech-1")?
    };

    let raised = ThresholdPolicy::new(Money::whole(50_000), Money::whole(100_000))?;
    let service = ApprovalCoordinator::new(store, AllowAll, raised);

    let record = service.approve(&record.id, "mgr-1")?;
    assert_eq!(record.status, Status::PendingTier3);
    assert_eq!(record.required_tiers, vec![Tier::Tier2, Tier::Tier3]);

    Ok(())
}

#[test]
fn records_survive_reopen() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("reopen.db");

    let id = {
        let store = SledStore::open(&db_path)?;
        let service = ApprovalCoordinator::new(store, AllowAll, policy());
        let record = service.create_approvable(order("Pump", 6_000), "tech-1")?;
        service.store().flush()?;
        record.id
    };

    let service = ApprovalCoordinator::new(SledStore::open(&db_path)?, AllowAll, policy());
    let record = service.approve(&id, "mgr-1")?;
    assert_eq!(record.status, Status::Approved);

    let next = service.create_approvable(order("Pump", 6_000), "tech-1")?;
    assert_eq!(next.number, "PO-0002");

    record.view_history();
    assert_eq!(record.history.len(), 3);

    Ok(())
}
