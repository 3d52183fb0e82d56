use super::money::Money;
use super::state_machine::{EventKind, Status};
use super::threshold::Tier;
use rust_decimal::Decimal;

/// Malformed input. Never partially applied; the caller corrects and retries.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount {0} is negative")]
    NegativeAmount(Decimal),
    #[error("amount {0} has more than two decimal places")]
    ExcessPrecision(Decimal),
    #[error("amount {0} is out of range")]
    AmountOutOfRange(Decimal),
    #[error("`{0}` is not a valid amount")]
    Unparseable(String),
    #[error("rejection reason must not be empty")]
    EmptyReason,
    #[error("a variance of {percent}% requires a justification")]
    MissingJustification { percent: Decimal },
    #[error("actor id must not be empty")]
    MissingActor,
    #[error("title must not be empty")]
    MissingTitle,
    #[error("purchase order has no line items")]
    NoLineItems,
    #[error("line item `{0}` overflows the order total")]
    LineItemOverflow(String),
    #[error("tier 2 threshold {tier2} exceeds tier 3 threshold {tier3}")]
    ThresholdOrder { tier2: Money, tier3: Money },
    #[error("record `{id}` is {status} and cannot be superseded")]
    NotSupersedable { id: String, status: Status },
    #[error("record invariant violated: {0}")]
    Invariant(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("corrupt sequence counter for `{0}`")]
    CorruptSequence(String),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(thiserror::Error, Debug)]
pub enum IdError {
    #[error(transparent)]
    Hrp(#[from] bech32::primitives::hrp::Error),
    #[error(transparent)]
    Encode(#[from] bech32::EncodeError),
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("record `{id}` was not found")]
    NotFound { id: String },
    #[error("cannot {event} a record that is {status}")]
    InvalidTransition { event: EventKind, status: Status },
    #[error("record `{id}` has already been processed ({status})")]
    AlreadyProcessed { id: String, status: Status },
    #[error("record `{id}` changed concurrently, it is no longer {expected}")]
    Conflict { id: String, expected: Status },
    #[error("actor `{actor}` may not sign {tier}")]
    Unauthorized { actor: String, tier: Tier },
    #[error("failed to allocate record id: {0}")]
    Identifier(#[from] IdError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WorkflowError {
    /// `AlreadyProcessed` is the common case of an invalid transition, so both match.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidTransition { .. } | WorkflowError::AlreadyProcessed { .. }
        )
    }
}
