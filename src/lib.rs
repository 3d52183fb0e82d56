//! Tiered approval workflow for purchase orders and service requisitions.
//!
//! [`service::ApprovalCoordinator`] is the entry point. It validates drafts,
//! routes them through [`threshold::ThresholdPolicy`], drives
//! [`state_machine::ApprovalStateMachine`] and commits through an
//! [`store::ApprovalStore`] with compare-and-swap semantics.

pub mod authorization;
pub mod config;
pub mod draft;
pub mod error;
pub mod logging;
pub mod money;
pub mod record;
pub mod service;
pub mod sled_store;
pub mod state_machine;
pub mod store;
pub mod threshold;
pub mod utils;
pub mod variance;
