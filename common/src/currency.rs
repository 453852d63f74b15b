use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A quantity of money in the smallest currency unit (wei).
///
/// Prices and payments are always whole numbers of this unit; nothing in the
/// ledger ever touches floating point.
pub type Amount = u128;

/// Display and input units. Amounts are always stored in wei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Denomination {
    #[default]
    Wei,
    Gwei,
    Ether,
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denomination::Wei => write!(f, "wei"),
            Denomination::Gwei => write!(f, "gwei"),
            Denomination::Ether => write!(f, "ETH"),
        }
    }
}

impl Denomination {
    /// Number of wei digits after the decimal point for this unit.
    pub fn decimals(self) -> u32 {
        match self {
            Denomination::Wei => 0,
            Denomination::Gwei => 9,
            Denomination::Ether => 18,
        }
    }

    /// Wei per one whole unit.
    pub fn scale(self) -> Amount {
        10u128.pow(self.decimals())
    }
}

impl FromStr for Denomination {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wei" => Ok(Denomination::Wei),
            "gwei" => Ok(Denomination::Gwei),
            "eth" | "ether" => Ok(Denomination::Ether),
            _ => Err(AmountError::UnknownUnit(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative")]
    Negative,
    #[error("malformed amount {0:?}")]
    Malformed(String),
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
    #[error("{unit} allows at most {max} fractional digits")]
    TooPrecise { unit: Denomination, max: u32 },
    #[error("amount does not fit in 128 bits of wei")]
    Overflow,
}

/// Parse `"<decimal> [unit]"` into wei, exactly.
///
/// `"1000"` and `"1000 wei"` are wei, `"1.5 ether"` is 1.5 × 10¹⁸ wei and
/// `"42 gwei"` is 42 × 10⁹ wei.
pub fn parse_amount(text: &str) -> Result<Amount, AmountError> {
    let mut parts = text.split_whitespace();
    let number = parts.next().ok_or(AmountError::Empty)?;
    let unit = match parts.next() {
        Some(u) => u.parse::<Denomination>()?,
        None => Denomination::Wei,
    };
    if parts.next().is_some() {
        return Err(AmountError::Malformed(text.to_string()));
    }
    if number.starts_with('-') {
        return Err(AmountError::Negative);
    }

    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (number, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || fraction.is_some_and(|f| !all_digits(f)) {
        return Err(AmountError::Malformed(text.to_string()));
    }

    let decimals = unit.decimals();
    let fraction = fraction.unwrap_or("");
    let fraction_len = u32::try_from(fraction.len()).map_err(|_| AmountError::Overflow)?;
    if fraction_len > decimals {
        return Err(AmountError::TooPrecise {
            unit,
            max: decimals,
        });
    }

    let whole: Amount = whole.parse().map_err(|_| AmountError::Overflow)?;
    let fraction_wei: Amount = if fraction.is_empty() {
        0
    } else {
        let digits: Amount = fraction.parse().map_err(|_| AmountError::Overflow)?;
        digits * 10u128.pow(decimals - fraction_len)
    };

    whole
        .checked_mul(unit.scale())
        .and_then(|w| w.checked_add(fraction_wei))
        .ok_or(AmountError::Overflow)
}

/// Render an amount (stored in wei) in the given unit without rounding.
pub fn format_amount(amount: Amount, unit: Denomination) -> String {
    let scale = unit.scale();
    let whole = amount / scale;
    let fraction = amount % scale;
    if fraction == 0 {
        return format!("{whole} {unit}");
    }
    let width = unit.decimals() as usize;
    let digits = format!("{fraction:0width$}");
    format!("{whole}.{} {unit}", digits.trim_end_matches('0'))
}

/// Serde adapter: amounts as decimal strings, so JSON clients never round them.
pub mod as_decimal_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<Amount>().map_err(serde::de::Error::custom)
    }
}
