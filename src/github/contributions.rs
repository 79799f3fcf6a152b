// Contribution queries against the GitHub GraphQL API.
// Implements ContributionSource on top of GitHubClient.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::contributions::{ContributionDay, ContributionSource};
use crate::error::{Result, StreakError};

use super::client::GitHubClient;
use super::types::{CalendarData, ContributionCalendar, YearsData};

const YEARS_QUERY: &str = r#"
query($user: String!) {
  user(login: $user) {
    contributionsCollection {
      contributionYears
    }
  }
}"#;

const CALENDAR_QUERY: &str = r#"
query($user: String!, $from: DateTime!, $to: DateTime!) {
  user(login: $user) {
    contributionsCollection(from: $from, to: $to) {
      contributionCalendar {
        weeks {
          contributionDays {
            date
            contributionCount
          }
        }
      }
    }
  }
}"#;

/// Query window for one calendar year. The current year ends at `now`.
pub fn year_range(year: i32, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let from = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
    let to = if year == now.year() {
        now
    } else {
        Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).single()?
    };
    Some((from, to))
}

/// Flatten a weekly calendar into daily entries, ascending by date.
pub fn days_from_calendar(calendar: ContributionCalendar) -> Result<Vec<ContributionDay>> {
    let mut days = Vec::new();
    for week in calendar.weeks {
        for day in week.contribution_days {
            let date = NaiveDate::parse_from_str(&day.date, "%Y-%m-%d").map_err(|source| {
                StreakError::InvalidDate {
                    value: day.date.clone(),
                    source,
                }
            })?;
            days.push(ContributionDay::from_date(date, day.contribution_count));
        }
    }
    days.sort_by_key(|d| (d.year, d.month, d.day));
    Ok(days)
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl ContributionSource for GitHubClient {
    async fn list_contribution_years(&self, user: &str) -> Result<BTreeSet<i32>> {
        let data: YearsData = self.query(YEARS_QUERY, json!({ "user": user })).await?;
        let user_data = data
            .user
            .ok_or_else(|| StreakError::UserNotFound(user.to_string()))?;
        let years: BTreeSet<i32> = user_data
            .contributions_collection
            .contribution_years
            .into_iter()
            .collect();

        info!(user, years = ?years, "fetched contribution years");
        Ok(years)
    }

    async fn fetch_year(
        &self,
        user: &str,
        year: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContributionDay>> {
        let (from, to) = year_range(year, now)
            .ok_or_else(|| StreakError::Validation(format!("year {} out of range", year)))?;
        debug!(user, year, from = %from, to = %to, "fetching contribution calendar");

        let variables = json!({
            "user": user,
            "from": timestamp(from),
            "to": timestamp(to),
        });
        let data: CalendarData = self.query(CALENDAR_QUERY, variables).await?;
        let user_data = data
            .user
            .ok_or_else(|| StreakError::UserNotFound(user.to_string()))?;

        let days = days_from_calendar(user_data.contributions_collection.contribution_calendar)?;
        info!(user, year, days = days.len(), "fetched contribution calendar");
        Ok(days)
    }
}
