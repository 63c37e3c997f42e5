use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::{op, Tzs};

//--------------------------------------       Coins       -----------------------------------------------------------
/// The platform's virtual currency unit. Coins are bought with shilling top-ups at a configured
/// exchange rate and spent on gifts within the app.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Coins(i64);

op!(binary Coins, Add, add);
op!(binary Coins, Sub, sub);
op!(inplace Coins, SubAssign, sub_assign);
op!(unary Coins, Neg, neg);

impl Sum for Coins {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Coins {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Coins {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Coins {}

impl Display for Coins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} coins", self.0)
    }
}

impl Coins {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Converts a shilling amount into coins at the given rate, rounding down.
    pub fn from_payment(amount: Tzs, coin_rate: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self((amount.value() as f64 * coin_rate).floor() as i64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conversion_rounds_down() {
        assert_eq!(Coins::from_payment(Tzs::from(10_000), 0.1), Coins::from(1_000));
        assert_eq!(Coins::from_payment(Tzs::from(10_000), 1.0), Coins::from(10_000));
        assert_eq!(Coins::from_payment(Tzs::from(999), 0.1), Coins::from(99));
        assert_eq!(Coins::from_payment(Tzs::from(5), 0.1), Coins::from(0));
    }
}
