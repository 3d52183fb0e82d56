//! Mapping from an amount to the approval tiers it needs
use super::config::ThresholdConfig;
use super::error::ValidationError;
use super::money::Money;
use std::fmt;

/// Approval authority level. Tier 2 always signs before Tier 3.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode,
)]
pub enum Tier {
    #[n(2)]
    Tier2, // mid-level manager
    #[n(3)]
    Tier3, // executive or owner
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Tier2 => f.write_str("tier 2"),
            Tier::Tier3 => f.write_str("tier 3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    tier2: Money,
    tier3: Money,
}

impl ThresholdPolicy {
    pub fn new(tier2: Money, tier3: Money) -> Result<Self, ValidationError> {
        if tier2 > tier3 {
            return Err(ValidationError::ThresholdOrder { tier2, tier3 });
        }
        Ok(Self { tier2, tier3 })
    }
    pub fn from_config(config: &ThresholdConfig) -> Result<Self, ValidationError> {
        Self::new(config.tier2_threshold, config.tier3_threshold)
    }
    pub fn tier2_threshold(&self) -> Money {
        self.tier2
    }
    pub fn tier3_threshold(&self) -> Money {
        self.tier3
    }

    /// Tiers that must sign, in signing order. Thresholds are inclusive: an
    /// amount equal to a threshold needs that tier.
    pub fn required_tiers(&self, amount: Money) -> Vec<Tier> {
        if amount >= self.tier3 {
            vec![Tier::Tier2, Tier::Tier3]
        } else if amount >= self.tier2 {
            vec![Tier::Tier2]
        } else {
            vec![]
        }
    }
}
