//! Service layer API for approval workflow operations
use super::authorization::TierAuthorizer;
use super::draft::ApprovableDraft;
use super::error::{ValidationError, WorkflowError};
use super::record::{ApprovableRecord, TimeStamp};
use super::state_machine::{ApprovalStateMachine, Event, Status, Transition};
use super::store::ApprovalStore;
use super::threshold::ThresholdPolicy;
use super::utils::{new_uuid_to_bech32, require_actor};
use tracing::{info, warn};

/// Runs create and decide operations against one record at a time. The store
/// holds the only authoritative copy; every commit is a conditional write.
pub struct ApprovalCoordinator<S, A> {
    store: S,
    authorizer: A,
    policy: ThresholdPolicy,
}

impl<S, A> ApprovalCoordinator<S, A>
where
    S: ApprovalStore,
    A: TierAuthorizer,
{
    pub fn new(store: S, authorizer: A, policy: ThresholdPolicy) -> Self {
        Self {
            store,
            authorizer,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    fn machine(&self) -> ApprovalStateMachine<'_, A> {
        ApprovalStateMachine::new(&self.policy, &self.authorizer)
    }

    /// Load record from the store
    fn load_record(&self, id: &str) -> Result<ApprovableRecord, WorkflowError> {
        self.store
            .load(id)?
            .ok_or_else(|| WorkflowError::NotFound { id: id.to_string() })
    }

    fn new_record(
        &self,
        draft: &ApprovableDraft,
        actor: &str,
        supersedes: Option<String>,
    ) -> Result<ApprovableRecord, WorkflowError> {
        let actor = require_actor(actor)?;
        let validated = draft.validate_and_finalise()?;
        let id = new_uuid_to_bech32(draft.kind().id_hrp())?;

        Ok(ApprovableRecord::draft(
            id,
            validated.title,
            validated.document,
            actor.to_string(),
            supersedes,
        )?)
    }

    /// Numbers are allocated last so refused submissions leave no gaps.
    fn insert_new(&self, mut record: ApprovableRecord) -> Result<ApprovableRecord, WorkflowError> {
        record.number = record.kind().format_number(self.store.next_number(record.kind())?);
        record.check_invariants()?;
        self.store.insert(&record)?;
        Ok(record)
    }

    fn submit_new(
        &self,
        draft: &ApprovableDraft,
        actor: &str,
        supersedes: Option<String>,
    ) -> Result<ApprovableRecord, WorkflowError> {
        let mut record = self.new_record(draft, actor, supersedes)?;
        let transition = self.machine().apply(
            &mut record,
            Event::Submit {
                actor: actor.to_string(),
            },
            TimeStamp::new(),
        )?;
        let record = self.insert_new(record)?;
        log_committed(&record, &transition, actor);
        Ok(record)
    }

    /// Load, apply `event`, and commit only if nobody moved the record since the load.
    fn transition(&self, id: &str, event: Event) -> Result<ApprovableRecord, WorkflowError> {
        let actor = event.actor().to_string();
        let kind = event.kind();
        let mut record = self.load_record(id)?;

        let transition = self
            .machine()
            .apply(&mut record, event, TimeStamp::new())
            .inspect_err(|error| {
                warn!(
                    event_name = "approvals.transition_refused",
                    record_id = id,
                    event = %kind,
                    actor = %actor,
                    %error,
                    "transition refused"
                )
            })?;
        record.check_invariants()?;

        let saved = self
            .store
            .save(&record, transition.from)
            .inspect_err(|error| {
                warn!(
                    event_name = "approvals.commit_failed",
                    record_id = id,
                    event = %kind,
                    expected = %transition.from,
                    %error,
                    "commit failed"
                )
            })?;
        log_committed(&saved, &transition, &actor);
        Ok(saved)
    }

    /// Validate, route and submit a new record in one step. Records below the
    /// Tier 2 threshold come back already approved.
    pub fn create_approvable(
        &self,
        draft: impl Into<ApprovableDraft>,
        actor: &str,
    ) -> Result<ApprovableRecord, WorkflowError> {
        self.submit_new(&draft.into(), actor, None)
    }

    /// Store a record in `Draft` without submitting it.
    pub fn create_draft(
        &self,
        draft: impl Into<ApprovableDraft>,
        actor: &str,
    ) -> Result<ApprovableRecord, WorkflowError> {
        let record = self.new_record(&draft.into(), actor, None)?;
        let record = self.insert_new(record)?;
        info!(
            event_name = "approvals.draft_created",
            record_id = %record.id,
            number = %record.number,
            actor = actor,
            "draft created"
        );
        Ok(record)
    }

    /// Replace the contents of a record still in `Draft`.
    pub fn update_draft(
        &self,
        id: &str,
        draft: impl Into<ApprovableDraft>,
        actor: &str,
    ) -> Result<ApprovableRecord, WorkflowError> {
        let validated = draft.into().validate_and_finalise()?;
        self.transition(
            id,
            Event::Revise {
                actor: actor.to_string(),
                title: validated.title,
                document: validated.document,
            },
        )
    }

    pub fn submit(&self, id: &str, actor: &str) -> Result<ApprovableRecord, WorkflowError> {
        self.transition(
            id,
            Event::Submit {
                actor: actor.to_string(),
            },
        )
    }

    /// Sign the tier currently awaiting action.
    pub fn approve(&self, id: &str, actor: &str) -> Result<ApprovableRecord, WorkflowError> {
        self.transition(
            id,
            Event::Approve {
                actor: actor.to_string(),
            },
        )
    }

    pub fn reject(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<ApprovableRecord, WorkflowError> {
        if reason.trim().is_empty() {
            return Err(ValidationError::EmptyReason.into());
        }
        self.transition(
            id,
            Event::Reject {
                actor: actor.to_string(),
                reason: reason.to_string(),
            },
        )
    }

    pub fn close(&self, id: &str, actor: &str) -> Result<ApprovableRecord, WorkflowError> {
        self.transition(
            id,
            Event::Close {
                actor: actor.to_string(),
            },
        )
    }

    /// New submission replacing a rejected or closed record.
    pub fn create_correction(
        &self,
        superseded_id: &str,
        draft: impl Into<ApprovableDraft>,
        actor: &str,
    ) -> Result<ApprovableRecord, WorkflowError> {
        let superseded = self.load_record(superseded_id)?;
        if !matches!(superseded.status, Status::Rejected | Status::Closed) {
            return Err(ValidationError::NotSupersedable {
                id: superseded.id,
                status: superseded.status,
            }
            .into());
        }
        self.submit_new(&draft.into(), actor, Some(superseded.id))
    }

    pub fn get(&self, id: &str) -> Result<ApprovableRecord, WorkflowError> {
        self.load_record(id)
    }

    pub fn list(&self, statuses: &[Status]) -> Result<Vec<ApprovableRecord>, WorkflowError> {
        self.store.query(statuses)
    }

    /// Pending records whose current tier `actor` may sign.
    pub fn pending_for(&self, actor: &str) -> Result<Vec<ApprovableRecord>, WorkflowError> {
        let actor = require_actor(actor)?;
        let pending = self.store.query(&Status::PENDING)?;
        Ok(pending
            .into_iter()
            .filter(|record| {
                record
                    .current_tier
                    .is_some_and(|tier| self.authorizer.is_authorized(actor, tier))
            })
            .collect())
    }
}

fn log_committed(record: &ApprovableRecord, transition: &Transition, actor: &str) {
    info!(
        event_name = "approvals.transition_committed",
        record_id = %record.id,
        number = %record.number,
        event = %transition.event,
        from = %transition.from,
        to = %transition.to,
        actor = actor,
        version = record.version,
        "transition committed"
    );
}
