//! Builders for new purchase orders and service requisitions
use super::error::ValidationError;
use super::money::Money;
use super::record::{Document, LineItem, PurchaseOrder, RecordKind, ServiceRequisition};
use super::variance::variance;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemDraft {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub is_deleted: bool,
}

// amounts stay as user-entered decimals until validate_and_finalise
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseOrderDraft {
    title: Option<String>,
    line_items: Vec<LineItemDraft>,
    tax: Decimal,
    shipping: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRequisitionDraft {
    title: Option<String>,
    original_estimate: Decimal,
    invoice_amount: Decimal,
    justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovableDraft {
    PurchaseOrder(PurchaseOrderDraft),
    ServiceRequisition(ServiceRequisitionDraft),
}

/// A draft whose amounts passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub title: String,
    pub document: Document,
}

impl PurchaseOrderDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn add_line_item(mut self, description: &str, quantity: u32, unit_price: Decimal) -> Self {
        self.line_items.push(LineItemDraft {
            description: description.to_string(),
            quantity,
            unit_price,
            is_deleted: false,
        });
        self
    }
    /// Soft delete: the line stays on the order for audit but stops counting.
    pub fn remove_line_item(mut self, index: usize) -> Self {
        if let Some(line) = self.line_items.get_mut(index) {
            line.is_deleted = true;
        }
        self
    }
    pub fn set_tax(mut self, tax: Decimal) -> Self {
        self.tax = tax;
        self
    }
    pub fn set_shipping(mut self, shipping: Decimal) -> Self {
        self.shipping = shipping;
        self
    }
    pub fn line_items(&self) -> &[LineItemDraft] {
        &self.line_items
    }

    pub fn validate_and_finalise(&self) -> Result<ValidatedDraft, ValidationError> {
        let title = require_title(self.title.as_deref())?;

        let mut line_items = Vec::with_capacity(self.line_items.len());
        let mut subtotal = Money::ZERO;
        for line in &self.line_items {
            let unit_price = Money::from_decimal(line.unit_price)?;
            let line_total = unit_price
                .checked_mul(line.quantity)
                .ok_or_else(|| ValidationError::LineItemOverflow(line.description.clone()))?;
            if !line.is_deleted {
                subtotal = subtotal
                    .checked_add(line_total)
                    .ok_or_else(|| ValidationError::LineItemOverflow(line.description.clone()))?;
            }
            line_items.push(LineItem {
                description: line.description.trim().to_string(),
                quantity: line.quantity,
                unit_price,
                line_total,
                is_deleted: line.is_deleted,
            });
        }
        if !line_items.iter().any(|line| !line.is_deleted) {
            return Err(ValidationError::NoLineItems);
        }

        let tax = Money::from_decimal(self.tax)?;
        let shipping = Money::from_decimal(self.shipping)?;
        let total = subtotal
            .checked_add(tax)
            .and_then(|sum| sum.checked_add(shipping))
            .ok_or(ValidationError::AmountOutOfRange(self.tax + self.shipping))?;

        Ok(ValidatedDraft {
            title,
            document: Document::PurchaseOrder(PurchaseOrder {
                line_items,
                subtotal,
                tax,
                shipping,
                total,
            }),
        })
    }
}

impl ServiceRequisitionDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_original_estimate(mut self, amount: Decimal) -> Self {
        self.original_estimate = amount;
        self
    }
    pub fn set_invoice_amount(mut self, amount: Decimal) -> Self {
        self.invoice_amount = amount;
        self
    }
    pub fn set_justification(mut self, justification: &str) -> Self {
        self.justification = Some(justification.to_string());
        self
    }

    /// Validates amounts and attaches the variance. A missing justification is
    /// not an error here; it only blocks submission.
    pub fn validate_and_finalise(&self) -> Result<ValidatedDraft, ValidationError> {
        let title = require_title(self.title.as_deref())?;
        let original_estimate = Money::from_decimal(self.original_estimate)?;
        let invoice_amount = Money::from_decimal(self.invoice_amount)?;
        let justification = self
            .justification
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        Ok(ValidatedDraft {
            title,
            document: Document::ServiceRequisition(ServiceRequisition {
                original_estimate,
                invoice_amount,
                variance: variance(original_estimate, invoice_amount),
                justification,
            }),
        })
    }
}

impl ApprovableDraft {
    pub fn kind(&self) -> RecordKind {
        match self {
            ApprovableDraft::PurchaseOrder(_) => RecordKind::PurchaseOrder,
            ApprovableDraft::ServiceRequisition(_) => RecordKind::ServiceRequisition,
        }
    }
    pub fn validate_and_finalise(&self) -> Result<ValidatedDraft, ValidationError> {
        match self {
            ApprovableDraft::PurchaseOrder(draft) => draft.validate_and_finalise(),
            ApprovableDraft::ServiceRequisition(draft) => draft.validate_and_finalise(),
        }
    }
}

impl From<PurchaseOrderDraft> for ApprovableDraft {
    fn from(value: PurchaseOrderDraft) -> Self {
        ApprovableDraft::PurchaseOrder(value)
    }
}

impl From<ServiceRequisitionDraft> for ApprovableDraft {
    fn from(value: ServiceRequisitionDraft) -> Self {
        ApprovableDraft::ServiceRequisition(value)
    }
}

fn require_title(title: Option<&str>) -> Result<String, ValidationError> {
    title
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .ok_or(ValidationError::MissingTitle)
}
