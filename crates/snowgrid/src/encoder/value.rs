use crate::{Error, Result, SUFFIX_DIGITS, SUFFIX_MODULUS};
use core::fmt;
use num_bigint::BigUint;

/// The representation an identifier field asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IdKind {
    /// Signed 64-bit integer.
    #[default]
    Integer,
    /// Decimal string, optionally date-prefixed and suffixed.
    String,
    /// Arbitrary precision integer, used for suffixed IDs that overflow 64
    /// bits.
    BigInteger,
}

impl core::str::FromStr for IdKind {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" | "long" => Ok(Self::Integer),
            "string" | "str" => Ok(Self::String),
            "biginteger" | "bigint" | "big" => Ok(Self::BigInteger),
            other => Err(format!(
                "unknown id kind `{other}` (expected integer, string or bigint)"
            )),
        }
    }
}

/// A generated identifier in one of the supported representations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdValue {
    Integer(i64),
    String(String),
    BigInteger(BigUint),
}

impl IdValue {
    pub const fn kind(&self) -> IdKind {
        match self {
            Self::Integer(_) => IdKind::Integer,
            Self::String(_) => IdKind::String,
            Self::BigInteger(_) => IdKind::BigInteger,
        }
    }

    /// Derives the suffix number this value contributes to a dependent
    /// field's composite ID.
    ///
    /// Integers are used as-is (negative values are rejected later by the
    /// encoder). Big integers and numeric strings contribute their last five
    /// decimal digits, which is all `suffix % 100000` keeps anyway.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCorrelatedValue`] for a string that is empty or
    /// not made only of ASCII digits.
    pub fn suffix_number(&self) -> Result<i64> {
        match self {
            Self::Integer(value) => Ok(*value),
            Self::BigInteger(value) => {
                let rem = value % BigUint::from(SUFFIX_MODULUS as u64);
                Ok(rem.iter_u64_digits().next().unwrap_or(0) as i64)
            }
            Self::String(value) => {
                if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::InvalidCorrelatedValue(value.clone()));
                }
                let tail = &value[value.len().saturating_sub(SUFFIX_DIGITS)..];
                tail.parse::<i64>()
                    .map_err(|_| Error::InvalidCorrelatedValue(value.clone()))
            }
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::BigInteger(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for IdValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<String> for IdValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<BigUint> for IdValue {
    fn from(value: BigUint) -> Self {
        Self::BigInteger(value)
    }
}
