use plg_common::Tzs;
use serde::{Deserialize, Serialize};

use crate::traits::{OrderSettlement, TopupSettlement};

/// Gross-to-net fee calculation for withdrawals: a proportional platform cut plus a flat
/// disbursement fee, both rounded down to whole shillings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Platform cut as a fraction of the gross, e.g. 0.05 for 5%.
    pub platform_rate: f64,
    pub flat_fee: Tzs,
    /// Smallest gross amount a withdrawal may request.
    pub minimum: Tzs,
}

impl FeeSchedule {
    pub fn fee_for(&self, gross: Tzs) -> Tzs {
        let platform_cut = (gross.value() as f64 * self.platform_rate).floor() as i64;
        Tzs::from(platform_cut) + self.flat_fee
    }

    pub fn net_for(&self, gross: Tzs) -> Tzs {
        gross - self.fee_for(gross)
    }
}

/// What a completed payment settled into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettlementResult {
    Topup(TopupSettlement),
    Order(OrderSettlement),
}

impl SettlementResult {
    pub fn credited(&self) -> bool {
        match self {
            SettlementResult::Topup(s) => s.credited,
            SettlementResult::Order(s) => s.credited,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            SettlementResult::Topup(s) => &s.reference,
            SettlementResult::Order(s) => &s.reference,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fee_breakdown() {
        let fees = FeeSchedule { platform_rate: 0.05, flat_fee: Tzs::from(500), minimum: Tzs::from(5_000) };
        // 5% of 50_000 is 2_500, plus the flat 500
        assert_eq!(fees.fee_for(Tzs::from(50_000)), Tzs::from(3_000));
        assert_eq!(fees.net_for(Tzs::from(50_000)), Tzs::from(47_000));
        // fractional cut rounds down: 5% of 10_001 = 500.05 -> 500
        assert_eq!(fees.fee_for(Tzs::from(10_001)), Tzs::from(1_000));
    }
}
