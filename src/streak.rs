// Streak calculation with grace days.
// Converts a dense daily contribution series into current/longest streak statistics.

use serde::{Deserialize, Serialize};

use crate::contributions::ContributionDay;
use crate::error::{Result, StreakError};

/// Default number of consecutive active days that earns one grace day.
pub const DEFAULT_GRACE_INTERVAL: u32 = 3;

/// Streak statistics derived from a contribution series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakResult {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub grace_days_remaining: u32,
}

/// One uninterrupted run of credited days.
#[derive(Debug, Default)]
struct Segment {
    streak: u32,
    grace: u32,
    eligible_run: u32,
}

impl Segment {
    fn credit_active_day(&mut self, grace_interval: u32) {
        self.streak += 1;
        self.eligible_run += 1;
        if self.eligible_run == grace_interval {
            self.grace += 1;
            self.eligible_run = 0;
        }
    }

    /// Spend a banked grace day on an idle day. Returns false if none is left.
    fn forgive_idle_day(&mut self) -> bool {
        if self.grace == 0 {
            return false;
        }
        self.streak += 1;
        self.grace -= 1;
        self.eligible_run = 0;
        true
    }
}

/// Compute streaks over `days`, which must be sorted ascending by date.
///
/// Every `grace_interval` consecutive active days bank one grace day, which
/// forgives a single later idle day. An idle day with nothing banked ends the
/// segment, except on the last day of the series: today may simply not have
/// contributions yet.
pub fn compute_streaks(days: &[ContributionDay], grace_interval: u32) -> Result<StreakResult> {
    if grace_interval == 0 {
        return Err(StreakError::Validation(
            "grace interval must be at least 1".to_string(),
        ));
    }

    let mut current = Segment::default();
    let mut best = 0u32;

    for (i, day) in days.iter().enumerate() {
        let is_last = i + 1 == days.len();

        if day.count > 0 {
            current.credit_active_day(grace_interval);
        } else if !current.forgive_idle_day() {
            if is_last {
                current.eligible_run = 0;
            } else {
                best = best.max(current.streak);
                current = Segment::default();
            }
        }
    }

    Ok(StreakResult {
        current_streak: current.streak,
        longest_streak: best.max(current.streak),
        grace_days_remaining: current.grace,
    })
}
