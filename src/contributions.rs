// Contribution history model.
// Daily contribution counts per user and the source trait used to fetch them.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Contributions recorded on one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionDay {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub count: u32,
}

impl ContributionDay {
    pub fn from_date(date: NaiveDate, count: u32) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            count,
        }
    }

    /// Ordering key: (year, month, day).
    fn key(&self) -> (i32, u32, u32) {
        (self.year, self.month, self.day)
    }
}

/// A user's fetched contribution history.
///
/// `days` is kept sorted ascending and holds at most one entry per date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionHistory {
    pub years: BTreeSet<i32>,
    pub days: Vec<ContributionDay>,
}

impl ContributionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fetched year without touching other entries.
    pub fn extend_year(&mut self, year: i32, days: Vec<ContributionDay>) {
        self.years.insert(year);
        self.days.extend(days);
        self.normalize();
    }

    /// Replace every entry of `year` with freshly fetched days.
    ///
    /// Entries are matched by calendar date, so days of other years are kept as-is.
    pub fn replace_year(&mut self, year: i32, days: Vec<ContributionDay>) {
        self.days.retain(|d| d.year != year);
        self.extend_year(year, days);
    }

    /// Sum of all daily counts.
    pub fn total_contributions(&self) -> u64 {
        self.days.iter().map(|d| u64::from(d.count)).sum()
    }

    /// Sort ascending and drop duplicate dates, last write wins.
    fn normalize(&mut self) {
        let unique: BTreeMap<_, _> = self.days.drain(..).map(|d| (d.key(), d)).collect();
        self.days = unique.into_values().collect();
    }
}

/// Upstream provider of contribution data.
#[async_trait]
pub trait ContributionSource: Send + Sync {
    /// Calendar years in which the user has any recorded activity.
    async fn list_contribution_years(&self, user: &str) -> Result<BTreeSet<i32>>;

    /// Daily counts for one calendar year, ascending by date.
    ///
    /// When `year` is the year of `now`, the window ends at `now`.
    async fn fetch_year(
        &self,
        user: &str,
        year: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContributionDay>>;

    /// Full history from the first contribution year through the year of `now`,
    /// fetched oldest first.
    async fn fetch_history(&self, user: &str, now: DateTime<Utc>) -> Result<ContributionHistory> {
        let mut years = self.list_contribution_years(user).await?;
        // Idle years are not listed but still hold days that break streaks.
        if let Some(&first) = years.first() {
            years.extend(first..=now.year());
        }

        let mut history = ContributionHistory::new();
        for year in years {
            let days = self.fetch_year(user, year, now).await?;
            history.extend_year(year, days);
        }
        Ok(history)
    }
}
