//! Fixed-precision monetary amounts
use super::error::ValidationError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;
use std::str::FromStr;

/// Decimal places carried by every amount.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// A non-negative amount held as integer minor units (cents).
///
/// Amounts never exceed `i64::MAX` minor units so that signed deltas between
/// two of them always fit in an `i64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);
    pub const MAX: Money = Money(i64::MAX as u64);

    /// Build from minor units, clamping to [`Money::MAX`].
    pub fn from_minor(minor: u64) -> Self {
        Money(minor.min(Self::MAX.0))
    }
    /// Whole currency units, e.g. `Money::whole(5_000)` is 5,000.00
    pub fn whole(units: u32) -> Self {
        Money(u64::from(units) * 100)
    }
    pub fn minor(&self) -> u64 {
        self.0
    }
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Convert user input, refusing negative values and sub-cent precision.
    pub fn from_decimal(value: Decimal) -> Result<Self, ValidationError> {
        if value < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount(value));
        }
        let scaled = value
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(ValidationError::AmountOutOfRange(value))?;
        if !scaled.fract().is_zero() {
            return Err(ValidationError::ExcessPrecision(value));
        }
        let minor = scaled
            .trunc()
            .to_u64()
            .filter(|minor| *minor <= Self::MAX.0)
            .ok_or(ValidationError::AmountOutOfRange(value))?;

        Ok(Money(minor))
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let value = Decimal::from_str(input.trim())
            .map_err(|_| ValidationError::Unparseable(input.to_string()))?;
        Self::from_decimal(value)
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), MINOR_UNIT_SCALE)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0
            .checked_add(other.0)
            .filter(|sum| *sum <= Self::MAX.0)
            .map(Money)
    }

    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0
            .checked_mul(u64::from(quantity))
            .filter(|product| *product <= Self::MAX.0)
            .map(Money)
    }

    /// Signed difference `self - other` in minor units.
    pub fn delta_from(self, other: Money) -> i64 {
        // both sides are bounded by i64::MAX, so the difference cannot overflow
        self.0 as i64 - other.0 as i64
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl<C> minicbor::Encode<C> for Money {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Money {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let minor = d.u64()?;
        if minor > Self::MAX.0 {
            return Err(minicbor::decode::Error::message("amount exceeds i64::MAX minor units"));
        }
        Ok(Money(minor))
    }
}
