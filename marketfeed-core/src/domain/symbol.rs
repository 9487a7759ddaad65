//! Symbols, series partitions and the request enums that key them.

use crate::data::provider::DataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which family of series a partition holds. Doubles as the file-name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Stock,
    Index,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Stock => "stock",
            DataKind::Index => "index",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bar granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Period::Daily),
            "weekly" | "week" | "w" => Ok(Period::Weekly),
            "monthly" | "month" | "m" => Ok(Period::Monthly),
            other => Err(DataError::InvalidInput(format!(
                "unknown period '{other}' (expected daily, weekly or monthly)"
            ))),
        }
    }
}

/// Price adjustment for stock series. `Qfq` is forward-adjusted, `Hfq` backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjust {
    None,
    #[default]
    Qfq,
    Hfq,
}

impl Adjust {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adjust::None => "",
            Adjust::Qfq => "qfq",
            Adjust::Hfq => "hfq",
        }
    }
}

impl FromStr for Adjust {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Adjust::None),
            "qfq" => Ok(Adjust::Qfq),
            "hfq" => Ok(Adjust::Hfq),
            other => Err(DataError::InvalidInput(format!(
                "unknown adjust mode '{other}' (expected none, qfq or hfq)"
            ))),
        }
    }
}

/// Listing exchange, derived from the code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Exchange {
    /// Exchange of a six-digit stock code. Beijing codes start with 4, 8
    /// or (since 2024) 92.
    pub fn for_stock(code: &str) -> Self {
        if code.starts_with("92") {
            return Exchange::Beijing;
        }
        match code.as_bytes().first() {
            Some(b'6') | Some(b'9') | Some(b'5') => Exchange::Shanghai,
            Some(b'4') | Some(b'8') => Exchange::Beijing,
            _ => Exchange::Shenzhen,
        }
    }

    /// Exchange of a six-digit index code. Shanghai indices start with `000`,
    /// Shenzhen with `399`, Beijing with `899`.
    pub fn for_index(code: &str) -> Self {
        if code.starts_with("399") {
            Exchange::Shenzhen
        } else if code.starts_with("899") {
            Exchange::Beijing
        } else {
            Exchange::Shanghai
        }
    }

    /// Lowercase prefix used by Sina and Tencent (`sh600000`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Exchange::Shanghai => "sh",
            Exchange::Shenzhen => "sz",
            Exchange::Beijing => "bj",
        }
    }
}

/// Reject anything that is not a bare six-digit code.
pub fn validate_symbol(symbol: &str) -> Result<(), DataError> {
    if symbol.len() == 6 && symbol.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DataError::InvalidInput(format!(
            "invalid symbol '{symbol}': must be 6 digits"
        )))
    }
}

/// Strip exchange decorations: `sh600000`, `SZ000001`, `600000.SH` → bare code.
pub fn normalize_symbol(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let stripped = ["sh", "sz", "bj"]
        .iter()
        .find_map(|p| lower.strip_prefix(p))
        .unwrap_or(&lower);
    let stripped = [".sh", ".sz", ".bj"]
        .iter()
        .find_map(|s| stripped.strip_suffix(s))
        .unwrap_or(stripped);
    stripped.to_string()
}
