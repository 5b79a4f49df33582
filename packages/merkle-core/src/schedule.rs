//! Unlock math for vesting campaigns, for previewing what a claim would
//! stream. Percentages are 18-decimal fixed point (`PERCENT_SCALE` is 100%).

use serde::{Deserialize, Serialize};

use crate::TreeError;

pub const PERCENT_SCALE: u64 = 1_000_000_000_000_000_000;

/// Schedule shared by every stream a linear campaign creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearSchedule {
    /// Zero means "the claim's block timestamp".
    pub start_time: u64,
    pub start_unlock_percentage: u64,
    pub cliff_duration: u64,
    pub cliff_unlock_percentage: u64,
    pub total_duration: u64,
}

/// One discrete unlock. `duration` is relative to the previous tranche's end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tranche {
    pub duration: u64,
    pub unlock_percentage: u64,
}

/// `amount * percentage / PERCENT_SCALE` without intermediate overflow.
pub fn apply_percentage(amount: u128, percentage: u64) -> u128 {
    let scale = PERCENT_SCALE as u128;
    let pct = percentage as u128;
    (amount / scale) * pct + (amount % scale) * pct / scale
}

/// `amount * elapsed / duration` for `elapsed <= duration`.
fn pro_rata(amount: u128, elapsed: u64, duration: u64) -> u128 {
    if duration == 0 {
        return amount;
    }
    let d = duration as u128;
    let e = elapsed.min(duration) as u128;
    (amount / d) * e + (amount % d) * e / d
}

impl LinearSchedule {
    pub fn validate(&self) -> Result<(), TreeError> {
        let total_pct = self.start_unlock_percentage as u128 + self.cliff_unlock_percentage as u128;
        if total_pct > PERCENT_SCALE as u128 || self.cliff_duration > self.total_duration {
            return Err(TreeError::InvalidSchedule);
        }
        if self.cliff_duration == 0 && self.cliff_unlock_percentage != 0 {
            return Err(TreeError::InvalidSchedule);
        }
        Ok(())
    }

    /// Amount unlocked at `now` for a stream that started at `start`.
    pub fn unlocked(&self, amount: u128, start: u64, now: u64) -> u128 {
        if now < start {
            return 0;
        }
        let end = start.saturating_add(self.total_duration);
        if now >= end {
            return amount;
        }

        let start_unlock = apply_percentage(amount, self.start_unlock_percentage);
        let cliff_time = start.saturating_add(self.cliff_duration);
        if self.cliff_duration > 0 && now < cliff_time {
            return start_unlock;
        }
        let cliff_unlock = apply_percentage(amount, self.cliff_unlock_percentage);

        let unlocked = start_unlock + cliff_unlock;
        let streamable = amount.saturating_sub(unlocked);
        let stream_from = if self.cliff_duration > 0 { cliff_time } else { start };
        let streamed = pro_rata(streamable, now - stream_from, end - stream_from);
        (unlocked + streamed).min(amount)
    }
}

pub fn validate_tranches(tranches: &[Tranche]) -> Result<(), TreeError> {
    let sum: u128 = tranches.iter().map(|t| t.unlock_percentage as u128).sum();
    if tranches.is_empty() || sum != PERCENT_SCALE as u128 {
        return Err(TreeError::InvalidSchedule);
    }
    Ok(())
}

/// Per-tranche amounts. The last tranche absorbs rounding dust.
pub fn tranche_amounts(tranches: &[Tranche], amount: u128) -> Result<Vec<u128>, TreeError> {
    validate_tranches(tranches)?;
    let mut out = Vec::with_capacity(tranches.len());
    let mut allotted = 0u128;
    for (i, t) in tranches.iter().enumerate() {
        let value = if i + 1 == tranches.len() {
            amount - allotted
        } else {
            apply_percentage(amount, t.unlock_percentage)
        };
        allotted += value;
        out.push(value);
    }
    Ok(out)
}

/// Amount unlocked at `now` for a tranched stream that started at `start`.
pub fn tranche_unlocked(tranches: &[Tranche], amount: u128, start: u64, now: u64) -> Result<u128, TreeError> {
    let amounts = tranche_amounts(tranches, amount)?;
    let mut end = start;
    let mut unlocked = 0u128;
    for (t, value) in tranches.iter().zip(amounts) {
        end = end.saturating_add(t.duration);
        if now < end {
            break;
        }
        unlocked += value;
    }
    Ok(unlocked)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF: u64 = PERCENT_SCALE / 2;
    const QUARTER: u64 = PERCENT_SCALE / 4;

    #[test]
    fn linear_without_cliff() {
        let s = LinearSchedule {
            start_time: 0,
            start_unlock_percentage: 0,
            cliff_duration: 0,
            cliff_unlock_percentage: 0,
            total_duration: 100,
        };
        s.validate().unwrap();
        assert_eq!(s.unlocked(1_000, 50, 40), 0);
        assert_eq!(s.unlocked(1_000, 50, 50), 0);
        assert_eq!(s.unlocked(1_000, 50, 100), 500);
        assert_eq!(s.unlocked(1_000, 50, 150), 1_000);
    }

    #[test]
    fn linear_with_start_and_cliff_unlocks() {
        let s = LinearSchedule {
            start_time: 0,
            start_unlock_percentage: QUARTER,
            cliff_duration: 20,
            cliff_unlock_percentage: QUARTER,
            total_duration: 120,
        };
        s.validate().unwrap();
        assert_eq!(s.unlocked(1_000, 0, 10), 250);
        assert_eq!(s.unlocked(1_000, 0, 20), 500);
        // halfway through the post-cliff stream
        assert_eq!(s.unlocked(1_000, 0, 70), 750);
        assert_eq!(s.unlocked(1_000, 0, 120), 1_000);
    }

    #[test]
    fn linear_rejects_over_100_percent() {
        let s = LinearSchedule {
            start_time: 0,
            start_unlock_percentage: HALF + 1,
            cliff_duration: 10,
            cliff_unlock_percentage: HALF,
            total_duration: 100,
        };
        assert_eq!(s.validate(), Err(TreeError::InvalidSchedule));
    }

    #[test]
    fn tranches_unlock_in_steps() {
        let tranches = [
            Tranche { duration: 10, unlock_percentage: QUARTER },
            Tranche { duration: 10, unlock_percentage: QUARTER },
            Tranche { duration: 10, unlock_percentage: HALF },
        ];
        validate_tranches(&tranches).unwrap();
        assert_eq!(tranche_unlocked(&tranches, 1_000, 100, 105), Ok(0));
        assert_eq!(tranche_unlocked(&tranches, 1_000, 100, 110), Ok(250));
        assert_eq!(tranche_unlocked(&tranches, 1_000, 100, 125), Ok(500));
        assert_eq!(tranche_unlocked(&tranches, 1_000, 100, 130), Ok(1_000));
    }

    #[test]
    fn tranche_dust_goes_to_last() {
        let third = PERCENT_SCALE / 3;
        let tranches = [
            Tranche { duration: 1, unlock_percentage: third },
            Tranche { duration: 1, unlock_percentage: third },
            Tranche { duration: 1, unlock_percentage: PERCENT_SCALE - 2 * third },
        ];
        validate_tranches(&tranches).unwrap();
        let amounts = tranche_amounts(&tranches, 100).unwrap();
        assert_eq!(amounts.iter().sum::<u128>(), 100);
        assert_eq!(amounts, vec![33, 33, 34]);
    }

    #[test]
    fn tranches_must_sum_to_100_percent() {
        let tranches = [Tranche { duration: 1, unlock_percentage: HALF }];
        assert_eq!(validate_tranches(&tranches), Err(TreeError::InvalidSchedule));
        assert_eq!(validate_tranches(&[]), Err(TreeError::InvalidSchedule));
    }

    #[test]
    fn oversubscribed_tranches_are_rejected() {
        let tranches = [
            Tranche { duration: 10, unlock_percentage: PERCENT_SCALE },
            Tranche { duration: 10, unlock_percentage: PERCENT_SCALE },
            Tranche { duration: 10, unlock_percentage: 0 },
        ];
        assert_eq!(tranche_amounts(&tranches, 100), Err(TreeError::InvalidSchedule));
        assert_eq!(tranche_unlocked(&tranches, 100, 0, 10), Err(TreeError::InvalidSchedule));
    }

    #[test]
    fn percentage_of_huge_amount_does_not_overflow() {
        assert_eq!(apply_percentage(u128::MAX, PERCENT_SCALE), u128::MAX);
        assert_eq!(apply_percentage(u128::MAX, 0), 0);
    }
}
