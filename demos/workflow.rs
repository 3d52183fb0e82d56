//! Walks a purchase order and a service requisition through the workflow.
//!
//! Reads `approvals.toml` or `config/approvals.toml` if present, then
//! `APPROVALS_*` overrides. Run with `cargo run --example workflow`.

use procurement_approval::{
    authorization::ApproverRoster,
    config::{LoadOptions, WorkflowConfig},
    draft::{PurchaseOrderDraft, ServiceRequisitionDraft},
    logging,
    service::ApprovalCoordinator,
    sled_store::SledStore,
    threshold::Tier,
};
use rust_decimal::Decimal;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = WorkflowConfig::load(LoadOptions::default())?;
    logging::init(&config.logging)?;

    let store = Arc::new(SledStore::open(&config.storage.path)?);
    let roster: ApproverRoster = [("dana", Tier::Tier2), ("sam", Tier::Tier3)]
        .into_iter()
        .collect();
    let service = ApprovalCoordinator::new(store.clone(), roster, config.threshold_policy()?);

    let order = PurchaseOrderDraft::new()
        .set_title("Rooftop unit replacement")
        .add_line_item("RTU 10 ton", 1, Decimal::new(2_850_000, 2))
        .add_line_item("crane hire", 1, Decimal::new(180_000, 2))
        .set_tax(Decimal::new(228_000, 2))
        .set_shipping(Decimal::new(45_000, 2));
    let record = service.create_approvable(order, "tech-7")?;
    println!(
        "{} submitted, needs {:?}",
        record.number, record.required_tiers
    );

    let record = service.approve(&record.id, "dana")?;
    println!("{} is {}", record.number, record.status);
    let record = service.approve(&record.id, "sam")?;
    println!("{} is {}", record.number, record.status);
    record.view_history();

    let requisition = ServiceRequisitionDraft::new()
        .set_title("Boiler descale")
        .set_original_estimate(Decimal::from(4_800))
        .set_invoice_amount(Decimal::from(5_600))
        .set_justification("scale build-up worse than surveyed");
    let requisition = service.create_approvable(requisition, "tech-7")?;
    println!(
        "{} submitted as {}, pending for dana: {}",
        requisition.number,
        requisition.status,
        service.pending_for("dana")?.len()
    );

    let rejected = service.reject(&requisition.id, "dana", "get the survey report first")?;
    println!("{} is {}", rejected.number, rejected.status);

    store.flush()?;
    Ok(())
}
