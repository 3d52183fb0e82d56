//! Lifecycle of an approvable record
//!
//! Every mutation of a record goes through [`ApprovalStateMachine::apply`]. A
//! refused event leaves the record exactly as it was; an accepted one bumps
//! the version once and appends to the audit trail.
use super::authorization::TierAuthorizer;
use super::error::{ValidationError, WorkflowError};
use super::record::{ApprovableRecord, AuditAction, Document, Rejection, Signoff, TimeStamp};
use super::threshold::{ThresholdPolicy, Tier};
use super::utils::require_actor;
use chrono::Utc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Status {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingTier2,
    #[n(2)]
    PendingTier3,
    #[n(3)]
    Approved,
    #[n(4)]
    Rejected,
    #[n(5)]
    Closed,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Draft,
        Status::PendingTier2,
        Status::PendingTier3,
        Status::Approved,
        Status::Rejected,
        Status::Closed,
    ];
    pub const PENDING: [Status; 2] = [Status::PendingTier2, Status::PendingTier3];

    pub fn is_pending(self) -> bool {
        matches!(self, Status::PendingTier2 | Status::PendingTier3)
    }
    /// Decided records. `Approved` still accepts `Close`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Approved | Status::Rejected | Status::Closed)
    }
    /// The tier awaiting action in this status
    pub fn pending_tier(self) -> Option<Tier> {
        match self {
            Status::PendingTier2 => Some(Tier::Tier2),
            Status::PendingTier3 => Some(Tier::Tier3),
            Status::Draft | Status::Approved | Status::Rejected | Status::Closed => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Draft => "draft",
            Status::PendingTier2 => "pending_tier2",
            Status::PendingTier3 => "pending_tier3",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
            Status::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Revise {
        actor: String,
        title: String,
        document: Document,
    },
    Submit {
        actor: String,
    },
    Approve {
        actor: String,
    },
    Reject {
        actor: String,
        reason: String,
    },
    Close {
        actor: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Revise,
    Submit,
    Approve,
    Reject,
    Close,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Revise { .. } => EventKind::Revise,
            Event::Submit { .. } => EventKind::Submit,
            Event::Approve { .. } => EventKind::Approve,
            Event::Reject { .. } => EventKind::Reject,
            Event::Close { .. } => EventKind::Close,
        }
    }
    pub fn actor(&self) -> &str {
        match self {
            Event::Revise { actor, .. }
            | Event::Submit { actor }
            | Event::Approve { actor }
            | Event::Reject { actor, .. }
            | Event::Close { actor } => actor,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Revise => "revise",
            EventKind::Submit => "submit",
            EventKind::Approve => "approve",
            EventKind::Reject => "reject",
            EventKind::Close => "close",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Status,
    pub to: Status,
    pub event: EventKind,
}

pub struct ApprovalStateMachine<'a, A: ?Sized> {
    policy: &'a ThresholdPolicy,
    authorizer: &'a A,
}

impl<'a, A> ApprovalStateMachine<'a, A>
where
    A: TierAuthorizer + ?Sized,
{
    pub fn new(policy: &'a ThresholdPolicy, authorizer: &'a A) -> Self {
        Self { policy, authorizer }
    }

    /// Apply `event` to `record`. Guards run before anything is written, so an
    /// error always leaves `record` untouched.
    pub fn apply(
        &self,
        record: &mut ApprovableRecord,
        event: Event,
        at: TimeStamp<Utc>,
    ) -> Result<Transition, WorkflowError> {
        let from = record.status;
        let kind = event.kind();
        let actor = require_actor(event.actor())?.to_string();

        match (from, event) {
            (Status::Draft, Event::Revise { title, document, .. }) => {
                let details_hash = document.digest()?;
                record.title = title;
                record.document = document;
                record.record_action(actor, at, AuditAction::Revised { details_hash });
            }
            (Status::Draft, Event::Submit { .. }) => {
                check_justification(&record.document)?;
                let details_hash = record.document.digest()?;
                let required_tiers = self.policy.required_tiers(record.triggering_amount());

                record.submitted = Some(Signoff {
                    by: actor.clone(),
                    at: at.clone(),
                });
                record.details_hash = Some(details_hash.clone());
                record.required_tiers = required_tiers.clone();
                record.record_action(
                    actor.clone(),
                    at.clone(),
                    AuditAction::Submitted {
                        details_hash,
                        required_tiers: required_tiers.clone(),
                    },
                );

                if required_tiers.is_empty() {
                    record.status = Status::Approved;
                    record.current_tier = None;
                    record.auto_approved_at = Some(at.clone());
                    record.record_action(actor, at, AuditAction::AutoApproved);
                } else {
                    record.status = Status::PendingTier2;
                    record.current_tier = Some(Tier::Tier2);
                }
            }
            (Status::PendingTier2, Event::Approve { .. }) => {
                self.check_authorized(&actor, Tier::Tier2)?;
                record.tier2_approval = Some(Signoff {
                    by: actor.clone(),
                    at: at.clone(),
                });
                if record.required_tiers.contains(&Tier::Tier3) {
                    record.status = Status::PendingTier3;
                    record.current_tier = Some(Tier::Tier3);
                } else {
                    record.status = Status::Approved;
                    record.current_tier = None;
                }
                record.record_action(actor, at, AuditAction::Approved { tier: Tier::Tier2 });
            }
            (Status::PendingTier3, Event::Approve { .. }) => {
                self.check_authorized(&actor, Tier::Tier3)?;
                record.tier3_approval = Some(Signoff {
                    by: actor.clone(),
                    at: at.clone(),
                });
                record.status = Status::Approved;
                record.current_tier = None;
                record.record_action(actor, at, AuditAction::Approved { tier: Tier::Tier3 });
            }
            (Status::PendingTier2 | Status::PendingTier3, Event::Reject { reason, .. }) => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(ValidationError::EmptyReason.into());
                }
                let tier = from.pending_tier().unwrap_or(Tier::Tier2);
                self.check_authorized(&actor, tier)?;
                record.rejection = Some(Rejection {
                    by: actor.clone(),
                    at: at.clone(),
                    tier,
                    reason: reason.to_string(),
                });
                record.status = Status::Rejected;
                record.current_tier = None;
                record.record_action(
                    actor,
                    at,
                    AuditAction::Rejected {
                        tier,
                        reason: reason.to_string(),
                    },
                );
            }
            (Status::Approved, Event::Close { .. }) => {
                record.closed = Some(Signoff {
                    by: actor.clone(),
                    at: at.clone(),
                });
                record.status = Status::Closed;
                record.record_action(actor, at, AuditAction::Closed);
            }
            // a decision on a record not awaiting one counts as already processed
            (status, _)
                if status.is_terminal()
                    || matches!(kind, EventKind::Approve | EventKind::Reject) =>
            {
                return Err(WorkflowError::AlreadyProcessed {
                    id: record.id.clone(),
                    status,
                });
            }
            (status, _) => {
                return Err(WorkflowError::InvalidTransition {
                    event: kind,
                    status,
                });
            }
        }

        record.version += 1;

        Ok(Transition {
            from,
            to: record.status,
            event: kind,
        })
    }

    fn check_authorized(&self, actor: &str, tier: Tier) -> Result<(), WorkflowError> {
        if self.authorizer.is_authorized(actor, tier) {
            return Ok(());
        }
        Err(WorkflowError::Unauthorized {
            actor: actor.to_string(),
            tier,
        })
    }
}

/// A flagged variance needs a non-blank justification before leaving `Draft`.
fn check_justification(document: &Document) -> Result<(), ValidationError> {
    if let Document::ServiceRequisition(sr) = document {
        let justified = sr
            .justification
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty());
        if sr.variance.requires_justification && !justified {
            return Err(ValidationError::MissingJustification {
                percent: sr.variance.percent.value(),
            });
        }
    }
    Ok(())
}
