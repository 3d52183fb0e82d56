//! Estimate versus actual variance for service requisitions
use super::money::Money;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

/// Variances strictly above this many percent need a written justification.
pub const JUSTIFICATION_THRESHOLD_PCT: Decimal = Decimal::TEN;

/// Percentage, rounded to two places for storage and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Percent(pub Decimal);

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Variance {
    #[n(0)]
    pub delta: i64, // minor units, positive is over budget
    #[n(1)]
    pub percent: Percent,
    #[n(2)]
    pub requires_justification: bool,
}

/// Compare an original estimate against the actual or invoiced amount.
///
/// A zero estimate counts as a 100% variance when anything was spent and 0%
/// otherwise.
pub fn variance(estimate: Money, actual: Money) -> Variance {
    let delta = actual.delta_from(estimate);

    let exact = if !estimate.is_zero() {
        Decimal::from(delta) * Decimal::ONE_HUNDRED / Decimal::from(estimate.minor())
    } else if !actual.is_zero() {
        Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };

    Variance {
        delta,
        percent: Percent(
            exact
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                .normalize(),
        ),
        requires_justification: exact.abs() > JUSTIFICATION_THRESHOLD_PCT,
    }
}

impl Variance {
    pub fn delta_amount(&self) -> Decimal {
        Decimal::new(self.delta, super::money::MINOR_UNIT_SCALE)
    }
}

impl Percent {
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl<C> minicbor::Encode<C> for Percent {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.0.serialize())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Percent {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let raw: [u8; 16] = d
            .bytes()?
            .try_into()
            .map_err(|_| minicbor::decode::Error::message("percent must be 16 bytes"))?;

        Ok(Percent(Decimal::deserialize(raw)))
    }
}
