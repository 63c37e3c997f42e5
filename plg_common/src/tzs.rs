use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const TZS_CURRENCY_CODE: &str = "TZS";
pub const TZS_CURRENCY_CODE_LOWER: &str = "tzs";

//--------------------------------------        Tzs        -----------------------------------------------------------
/// An amount of Tanzanian shillings. Whole shillings only; the gateway does not deal in cents.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Tzs(i64);

op!(binary Tzs, Add, add);
op!(binary Tzs, Sub, sub);
op!(inplace Tzs, SubAssign, sub_assign);
op!(unary Tzs, Neg, neg);

impl Mul<i64> for Tzs {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Tzs {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in shillings: {0}")]
pub struct TzsConversionError(String);

impl From<i64> for Tzs {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Tzs {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Tzs {}

impl TryFrom<u64> for Tzs {
    type Error = TzsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(TzsConversionError(format!("Value {} is too large to convert to Tzs", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl FromStr for Tzs {
    type Err = TzsConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self).map_err(|e| TzsConversionError(format!("{s} is not a valid amount: {e}")))
    }
}

impl Display for Tzs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TZS {}", self.0)
    }
}

impl Tzs {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Tzs::from(10_000);
        let b = Tzs::from(2_500);
        assert_eq!(a + b, Tzs::from(12_500));
        assert_eq!(a - b, Tzs::from(7_500));
        assert_eq!(-b, Tzs::from(-2_500));
        assert_eq!(b * 4, Tzs::from(10_000));
        let total: Tzs = [a, b, b].into_iter().sum();
        assert_eq!(total, Tzs::from(15_000));
    }

    #[test]
    fn parsing() {
        assert_eq!("5000".parse::<Tzs>().unwrap(), Tzs::from(5_000));
        assert!(" 12000 ".parse::<Tzs>().is_ok());
        assert!("12.5".parse::<Tzs>().is_err());
    }
}
