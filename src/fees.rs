//! Fee arithmetic shared by tip intake and reporting.
//!
//! All amounts are integer minor currency units.

use crate::error::{ServiceError, ServiceResult};
use crate::models::TipAmounts;

/// Commission retained by the platform in percent of the tip amount.
pub const PLATFORM_FEE_PERCENT: i64 = 5;

/// Smallest tip a guest can send.
pub const MIN_TIP_AMOUNT: i64 = 1_000;

/// Largest tip a guest can send.
pub const MAX_TIP_AMOUNT: i64 = 100_000_000;

/// `ceil(amount * 5%)`, computed without floating point.
pub fn platform_fee(amount: i64) -> i64 {
    let scaled = amount * PLATFORM_FEE_PERCENT;
    if scaled > 0 {
        (scaled + 99) / 100
    } else {
        scaled / 100
    }
}

impl TipAmounts {
    /// Split a requested tip into fee, net and the amount charged to the guest.
    pub fn compute(amount: i64, guest_pays_fee: bool) -> ServiceResult<TipAmounts> {
        if amount < MIN_TIP_AMOUNT {
            return Err(ServiceError::validation("Minimum tip amount is 1,000"));
        }
        if amount > MAX_TIP_AMOUNT {
            return Err(ServiceError::validation("Maximum tip amount is 100,000,000"));
        }

        let platform_fee = platform_fee(amount);
        let net_amount = amount - platform_fee;
        let total_amount = if guest_pays_fee {
            amount + platform_fee
        } else {
            amount
        };

        Ok(TipAmounts {
            amount,
            platform_fee,
            net_amount,
            total_amount,
            guest_pays_fee,
        })
    }
}

/// Split `amount` evenly into `parts` shares. The first `amount % parts`
/// shares receive one extra unit so the shares always sum to `amount`.
pub fn split_evenly(amount: i64, parts: usize) -> Vec<i64> {
    if parts == 0 {
        return Vec::new();
    }

    let parts_i64 = parts as i64;
    let base = amount / parts_i64;
    let remainder = amount % parts_i64;

    (0..parts_i64)
        .map(|index| if index < remainder { base + 1 } else { base })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_fee_rounds_up() {
        assert_eq!(platform_fee(50_000), 2_500);
        assert_eq!(platform_fee(1_000), 50);
        assert_eq!(platform_fee(1_001), 51);
        assert_eq!(platform_fee(1_019), 51);
        assert_eq!(platform_fee(1_020), 51);
        assert_eq!(platform_fee(1_021), 52);
        assert_eq!(platform_fee(142_500), 7_125);
        assert_eq!(platform_fee(0), 0);
    }

    #[test]
    fn test_compute_example() {
        let amounts = TipAmounts::compute(50_000, false).unwrap();
        assert_eq!(amounts.platform_fee, 2_500);
        assert_eq!(amounts.net_amount, 47_500);
        assert_eq!(amounts.total_amount, 50_000);

        let amounts = TipAmounts::compute(50_000, true).unwrap();
        assert_eq!(amounts.total_amount, 52_500);
        assert_eq!(amounts.net_amount, 47_500);
    }

    #[test]
    fn test_compute_rejects_small_amounts() {
        assert_eq!(
            TipAmounts::compute(33, false),
            Err(ServiceError::validation("Minimum tip amount is 1,000"))
        );
        assert!(TipAmounts::compute(999, true).is_err());
        assert!(TipAmounts::compute(-5_000, true).is_err());
    }

    #[test]
    fn test_compute_rejects_huge_amounts() {
        assert_eq!(
            TipAmounts::compute(i64::MAX / 2, false),
            Err(ServiceError::validation("Maximum tip amount is 100,000,000"))
        );
        assert!(TipAmounts::compute(i64::MAX, true).is_err());
        assert!(TipAmounts::compute(MAX_TIP_AMOUNT + 1, true).is_err());

        let amounts = TipAmounts::compute(MAX_TIP_AMOUNT, true).unwrap();
        assert_eq!(amounts.platform_fee, 5_000_000);
        assert_eq!(amounts.total_amount, 105_000_000);
    }

    #[test]
    fn test_net_and_fee_reconstruct_amount() {
        for amount in (MIN_TIP_AMOUNT..60_000).step_by(7) {
            for guest_pays_fee in [false, true] {
                let amounts = TipAmounts::compute(amount, guest_pays_fee).unwrap();
                assert_eq!(amounts.net_amount + amounts.platform_fee, amount);
                assert!(amounts.platform_fee * 100 >= amount * 5, "fee of {amount}");
                assert!((amounts.platform_fee - 1) * 100 < amount * 5, "fee of {amount}");
                if guest_pays_fee {
                    assert_eq!(amounts.total_amount, amount + amounts.platform_fee);
                } else {
                    assert_eq!(amounts.total_amount, amount);
                }
            }
        }
    }

    #[test]
    fn test_split_evenly() {
        assert_eq!(split_evenly(100, 3), vec![34, 33, 33]);
        assert_eq!(split_evenly(47_500, 2), vec![23_750, 23_750]);
        assert_eq!(split_evenly(5, 0), Vec::<i64>::new());
        assert_eq!(split_evenly(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(split_evenly(95_001, 4).iter().sum::<i64>(), 95_001);
    }
}
