//! Money value objects: strictly positive amounts and ISO-style currency codes.
//!
//! Balances are exact fixed-point decimals (`rust_decimal::Decimal`); floats never
//! enter the money path.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Fractional digits kept by storage (`NUMERIC(38, 10)`).
pub const MAX_SCALE: u32 = 10;

/// Exclusive upper bound of a single movement.
pub fn amount_limit() -> Decimal {
    Decimal::from(1_000_000_000_000_000_i64)
}

/// Exclusive upper bound of a balance: the integer range of `NUMERIC(38, 10)`.
pub fn balance_limit() -> Decimal {
    Decimal::from_i128_with_scale(10_i128.pow(28), 0)
}

/// Check that `value` fits the storage precision.
pub fn check_scale(value: Decimal) -> DomainResult<()> {
    if value.normalize().scale() > MAX_SCALE {
        return Err(DomainError::validation(format!(
            "at most {MAX_SCALE} decimal places are supported (got {value})"
        )));
    }
    Ok(())
}

/// A strictly positive monetary amount (the amount of a movement).
///
/// Bounded by [`amount_limit`] and [`MAX_SCALE`]. Balances themselves are plain
/// `Decimal`s because they may legitimately be zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "amount must be greater than zero (got {value})"
            )));
        }
        if value >= amount_limit() {
            return Err(DomainError::validation(format!(
                "amount must be less than {} (got {value})",
                amount_limit()
            )));
        }
        check_scale(value)?;
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Three-letter uppercase currency code (e.g. `USD`, `EUR`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> DomainResult<Self> {
        let code = code.into();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter uppercase code (got '{code}')"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_must_be_positive() {
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert!(matches!(Amount::new(dec!(0)), Err(DomainError::Validation(_))));
        assert!(matches!(Amount::new(dec!(-5)), Err(DomainError::Validation(_))));
    }

    #[test]
    fn amount_is_bounded_in_size_and_precision() {
        assert!(Amount::new(dec!(999999999999999.9999999999)).is_ok());
        assert!(Amount::new(amount_limit()).is_err());
        assert!(Amount::new(Decimal::MAX).is_err());

        assert!(Amount::new(dec!(1.0000000001)).is_ok());
        assert!(matches!(
            Amount::new(dec!(1.00000000001)),
            Err(DomainError::Validation(_))
        ));
        assert!(Amount::new(dec!(0.00000000001)).is_err());
        // Trailing zeros are not precision.
        assert!(Amount::new(dec!(2.500000000000)).is_ok());
    }

    #[test]
    fn amount_deserialization_enforces_positivity() {
        let ok: Amount = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(ok.value(), dec!(12.50));
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }

    #[test]
    fn currency_codes_are_three_uppercase_letters() {
        assert_eq!(Currency::new("USD").unwrap().as_str(), "USD");
        assert!(Currency::new("usd").is_err());
        assert!(Currency::new("EURO").is_err());
        assert!(serde_json::from_str::<Currency>("\"GB\"").is_err());
    }

    mod props {
        use proptest::prelude::*;
        use rust_decimal::Decimal;

        use crate::money::Amount;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

            #[test]
            fn amount_accepts_exactly_positive_values(units in -1_000_000i64..1_000_000, scale in 0u32..4) {
                let value = Decimal::new(units, scale);
                prop_assert_eq!(Amount::new(value).is_ok(), value > Decimal::ZERO);
            }
        }
    }
}
