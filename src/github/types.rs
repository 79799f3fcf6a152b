// GitHub GraphQL request and response types.
// Defines the envelope plus the contribution-years and contribution-calendar shapes.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreakError};

/// GraphQL request body.
#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a, V> {
    pub query: &'a str,
    pub variables: V,
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

impl<T> GraphQlResponse<T> {
    /// Unwrap `data`, turning reported errors into typed failures.
    pub fn into_data(self) -> Result<T> {
        if let Some(error) = self.errors.first() {
            if error.error_type.as_deref() == Some("NOT_FOUND") {
                return Err(StreakError::UserNotFound(error.message.clone()));
            }
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(StreakError::GraphQl(messages.join("; ")));
        }
        self.data
            .ok_or_else(|| StreakError::GraphQl("response contained no data".to_string()))
    }
}

/// `data` of the contribution years query.
#[derive(Debug, Deserialize)]
pub struct YearsData {
    pub user: Option<YearsUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearsUser {
    pub contributions_collection: YearsCollection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearsCollection {
    pub contribution_years: Vec<i32>,
}

/// `data` of the contribution calendar query.
#[derive(Debug, Deserialize)]
pub struct CalendarData {
    pub user: Option<CalendarUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarUser {
    pub contributions_collection: CalendarCollection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCollection {
    pub contribution_calendar: ContributionCalendar,
}

/// Contribution calendar, grouped by week.
#[derive(Debug, Deserialize)]
pub struct ContributionCalendar {
    pub weeks: Vec<CalendarWeek>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarWeek {
    pub contribution_days: Vec<CalendarDay>,
}

/// A single day as reported by the calendar.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: String,
    pub contribution_count: u32,
}

/// Rate limit information from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}
