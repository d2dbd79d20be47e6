//! Cell value widths.
//!
//! The automaton runs on signed 32-bit or 64-bit cells. [`CellValue`] is
//! the small arithmetic surface the engine needs; every operation is
//! checked so overflow is reported instead of wrapping.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Storage width of a cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueWidth {
    /// Signed 32-bit cells.
    I32,
    /// Signed 64-bit cells.
    I64,
}

impl ValueWidth {
    /// Size of one cell in bytes.
    pub const fn bytes(self) -> u64 {
        match self {
            Self::I32 => 4,
            Self::I64 => 8,
        }
    }
}

impl fmt::Display for ValueWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
        }
    }
}

/// A signed integer usable as a sandpile cell.
pub trait CellValue:
    Copy
    + fmt::Debug
    + fmt::Display
    + Default
    + PartialEq
    + Eq
    + PartialOrd
    + Ord
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// The additive identity.
    const ZERO: Self;
    /// Width tag written into block files and backups.
    const WIDTH: ValueWidth;

    /// Checked addition.
    fn checked_add(self, other: Self) -> Option<Self>;
    /// Checked subtraction.
    fn checked_sub(self, other: Self) -> Option<Self>;
    /// Checked multiplication.
    fn checked_mul(self, other: Self) -> Option<Self>;
    /// Truncating division; `None` on division by zero or overflow.
    fn checked_div(self, other: Self) -> Option<Self>;
    /// Converts from `i64` if the value fits.
    fn from_i64(value: i64) -> Option<Self>;
    /// Converts from `u64` if the value fits.
    fn from_u64(value: u64) -> Option<Self>;
    /// Widens to `i64`.
    fn to_i64(self) -> i64;
    /// Widens to `i128`.
    fn to_i128(self) -> i128;
}

macro_rules! impl_cell_value {
    ($ty:ty, $width:expr) => {
        impl CellValue for $ty {
            const ZERO: Self = 0;
            const WIDTH: ValueWidth = $width;

            fn checked_add(self, other: Self) -> Option<Self> {
                <$ty>::checked_add(self, other)
            }

            fn checked_sub(self, other: Self) -> Option<Self> {
                <$ty>::checked_sub(self, other)
            }

            fn checked_mul(self, other: Self) -> Option<Self> {
                <$ty>::checked_mul(self, other)
            }

            fn checked_div(self, other: Self) -> Option<Self> {
                <$ty>::checked_div(self, other)
            }

            fn from_i64(value: i64) -> Option<Self> {
                <$ty>::try_from(value).ok()
            }

            fn from_u64(value: u64) -> Option<Self> {
                <$ty>::try_from(value).ok()
            }

            fn to_i64(self) -> i64 {
                i64::from(self)
            }

            fn to_i128(self) -> i128 {
                i128::from(self)
            }
        }
    };
}

impl_cell_value!(i32, ValueWidth::I32);
impl_cell_value!(i64, ValueWidth::I64);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn widths_report_their_size() {
        assert_eq!(<i32 as CellValue>::WIDTH.bytes(), 4);
        assert_eq!(<i64 as CellValue>::WIDTH.bytes(), 8);
        assert_eq!(ValueWidth::I64.to_string(), "i64");
    }

    #[test]
    fn arithmetic_is_checked() {
        assert_eq!(CellValue::checked_add(i32::MAX, 1), None);
        assert_eq!(CellValue::checked_mul(3_i64, 4), Some(12));
        assert_eq!(CellValue::checked_div(-7_i32, 3), Some(-2));
        assert_eq!(<i32 as CellValue>::from_i64(i64::MAX), None);
        assert_eq!(<i32 as CellValue>::from_u64(9), Some(9));
    }
}
