//! Approvable records: purchase orders and service requisitions
use super::error::{StorageError, ValidationError};
use super::money::Money;
use super::state_machine::Status;
use super::threshold::Tier;
use super::variance::Variance;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// ordered by instant; the zone marker itself has no ordering
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum RecordKind {
    #[n(0)]
    PurchaseOrder,
    #[n(1)]
    ServiceRequisition,
}

impl RecordKind {
    /// Prefix of the human readable number, `PO-0001`
    pub fn number_prefix(&self) -> &'static str {
        match self {
            RecordKind::PurchaseOrder => "PO",
            RecordKind::ServiceRequisition => "SR",
        }
    }
    /// bech32 human readable part of the opaque id
    pub fn id_hrp(&self) -> &'static str {
        match self {
            RecordKind::PurchaseOrder => "po_",
            RecordKind::ServiceRequisition => "sr_",
        }
    }
    pub fn format_number(&self, sequence: u64) -> String {
        format!("{}-{:04}", self.number_prefix(), sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LineItem {
    #[n(0)]
    pub description: String,
    #[n(1)]
    pub quantity: u32,
    #[n(2)]
    pub unit_price: Money,
    #[n(3)]
    pub line_total: Money, // quantity * unit_price
    #[n(4)]
    pub is_deleted: bool, // kept for audit, excluded from totals
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PurchaseOrder {
    #[n(0)]
    pub line_items: Vec<LineItem>,
    #[n(1)]
    pub subtotal: Money,
    #[n(2)]
    pub tax: Money,
    #[n(3)]
    pub shipping: Money,
    #[n(4)]
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ServiceRequisition {
    #[n(0)]
    pub original_estimate: Money,
    #[n(1)]
    pub invoice_amount: Money,
    #[n(2)]
    pub variance: Variance,
    #[n(3)]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Document {
    #[n(0)]
    PurchaseOrder(#[n(0)] PurchaseOrder),
    #[n(1)]
    ServiceRequisition(#[n(0)] ServiceRequisition),
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Signoff {
    #[n(0)]
    pub by: String,
    #[n(1)]
    pub at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Rejection {
    #[n(0)]
    pub by: String,
    #[n(1)]
    pub at: TimeStamp<Utc>,
    #[n(2)]
    pub tier: Tier,
    #[n(3)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum AuditAction {
    #[n(0)]
    Drafted {
        #[n(0)]
        details_hash: String,
    },
    #[n(1)]
    Revised {
        #[n(0)]
        details_hash: String,
    },
    #[n(2)]
    Submitted {
        #[n(0)]
        details_hash: String,
        #[n(1)]
        required_tiers: Vec<Tier>,
    },
    #[n(3)]
    AutoApproved,
    #[n(4)]
    Approved {
        #[n(0)]
        tier: Tier,
    },
    #[n(5)]
    Rejected {
        #[n(0)]
        tier: Tier,
        #[n(1)]
        reason: String,
    },
    #[n(6)]
    Closed,
}

/// One entry of the append-only trail kept on every record.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AuditEntry {
    #[n(0)]
    pub actor: String,
    #[n(1)]
    pub at: TimeStamp<Utc>,
    #[n(2)]
    pub action: AuditAction,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovableRecord {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub number: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub document: Document,
    #[n(4)]
    pub status: Status,
    #[n(5)]
    pub required_tiers: Vec<Tier>, // frozen at submission
    #[n(6)]
    pub current_tier: Option<Tier>,
    #[n(7)]
    pub created_by: String,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub updated_at: TimeStamp<Utc>,
    #[n(10)]
    pub submitted: Option<Signoff>,
    #[n(11)]
    pub auto_approved_at: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub tier2_approval: Option<Signoff>,
    #[n(13)]
    pub tier3_approval: Option<Signoff>,
    #[n(14)]
    pub rejection: Option<Rejection>,
    #[n(15)]
    pub closed: Option<Signoff>,
    #[n(16)]
    pub details_hash: Option<String>, // sha256 of the document at submission
    #[n(17)]
    pub supersedes: Option<String>,
    #[n(18)]
    pub version: u64, // one bump per committed transition
    #[n(19)]
    pub history: Vec<AuditEntry>,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::PurchaseOrder => f.write_str("purchase order"),
            RecordKind::ServiceRequisition => f.write_str("service requisition"),
        }
    }
}

impl PurchaseOrder {
    pub fn visible_line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.line_items.iter().filter(|line| !line.is_deleted)
    }

    /// Recompute subtotal and total from the live line items and compare.
    pub fn reconcile(&self) -> Result<(), ValidationError> {
        let mut subtotal = Money::ZERO;
        for line in &self.line_items {
            let expected = line
                .unit_price
                .checked_mul(line.quantity)
                .ok_or_else(|| ValidationError::LineItemOverflow(line.description.clone()))?;
            if expected != line.line_total {
                return Err(ValidationError::Invariant(format!(
                    "line `{}` total {} != {} x {}",
                    line.description, line.line_total, line.quantity, line.unit_price
                )));
            }
            if !line.is_deleted {
                subtotal = subtotal
                    .checked_add(line.line_total)
                    .ok_or_else(|| ValidationError::LineItemOverflow(line.description.clone()))?;
            }
        }
        if subtotal != self.subtotal {
            return Err(ValidationError::Invariant(format!(
                "subtotal {} != sum of line items {}",
                self.subtotal, subtotal
            )));
        }
        let total = self
            .subtotal
            .checked_add(self.tax)
            .and_then(|sum| sum.checked_add(self.shipping));
        if total != Some(self.total) {
            return Err(ValidationError::Invariant(format!(
                "total {} != subtotal + tax + shipping",
                self.total
            )));
        }
        Ok(())
    }
}

impl Document {
    pub fn kind(&self) -> RecordKind {
        match self {
            Document::PurchaseOrder(_) => RecordKind::PurchaseOrder,
            Document::ServiceRequisition(_) => RecordKind::ServiceRequisition,
        }
    }
    /// The amount that decides which tiers must sign.
    pub fn triggering_amount(&self) -> Money {
        match self {
            Document::PurchaseOrder(po) => po.total,
            Document::ServiceRequisition(sr) => sr.invoice_amount,
        }
    }
    /// Returns a sha256 digest of the CBOR encoded document
    pub fn digest(&self) -> Result<String, StorageError> {
        let contents = minicbor::to_vec(self)?;
        Ok(sha256::digest(&contents))
    }
}

impl ApprovableRecord {
    /// A fresh record in `Draft`, with its creation already on the trail.
    pub fn draft(
        id: String,
        title: String,
        document: Document,
        created_by: String,
        supersedes: Option<String>,
    ) -> Result<Self, StorageError> {
        let now = TimeStamp::new();
        let details_hash = document.digest()?;
        let mut record = Self {
            id,
            number: String::new(),
            title,
            document,
            status: Status::Draft,
            required_tiers: vec![],
            current_tier: None,
            created_by: created_by.clone(),
            created_at: now.clone(),
            updated_at: now.clone(),
            submitted: None,
            auto_approved_at: None,
            tier2_approval: None,
            tier3_approval: None,
            rejection: None,
            closed: None,
            details_hash: None,
            supersedes,
            version: 1,
            history: vec![],
        };
        record.record_action(created_by, now, AuditAction::Drafted { details_hash });
        Ok(record)
    }

    pub fn kind(&self) -> RecordKind {
        self.document.kind()
    }

    pub fn triggering_amount(&self) -> Money {
        self.document.triggering_amount()
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn record_action(&mut self, actor: String, at: TimeStamp<Utc>, action: AuditAction) {
        self.updated_at = at.clone();
        self.history.push(AuditEntry { actor, at, action });
    }

    /// True when the document still hashes to what was submitted.
    pub fn details_unchanged(&self) -> Result<bool, StorageError> {
        match &self.details_hash {
            Some(hash) => Ok(*hash == self.document.digest()?),
            None => Ok(true),
        }
    }

    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        let violation = |msg: String| Err(ValidationError::Invariant(msg));

        match self.required_tiers.as_slice() {
            [] | [Tier::Tier2] | [Tier::Tier2, Tier::Tier3] => {}
            other => return violation(format!("tiers {other:?} are out of order")),
        }
        if self.rejection.is_some() != (self.status == Status::Rejected) {
            return violation(format!(
                "rejection present on a record that is {}",
                self.status
            ));
        }
        if self.status.is_pending() && self.required_tiers.is_empty() {
            return violation("pending record requires no tiers".to_string());
        }
        if self.auto_approved_at.is_some() && !self.required_tiers.is_empty() {
            return violation("auto-approved record requires tiers".to_string());
        }
        if self.current_tier != self.status.pending_tier() {
            return violation(format!(
                "current tier {:?} does not match status {}",
                self.current_tier, self.status
            ));
        }
        if self.version == 0 || self.version > self.history.len() as u64 {
            return violation(format!(
                "version {} is inconsistent with {} audit entries",
                self.version,
                self.history.len()
            ));
        }
        if let Document::PurchaseOrder(po) = &self.document {
            po.reconcile()?;
        }
        Ok(())
    }

    pub fn view_history(&self) {
        for entry in &self.history {
            tracing::info!(
                record_id = %self.id,
                number = %self.number,
                actor = %entry.actor,
                at = %entry.at.to_datetime_utc(),
                action = ?entry.action,
                "audit entry"
            );
        }
    }
}
