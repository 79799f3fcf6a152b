// HTTP data endpoint.
// Sanitizes query parameters, runs the cache + streak pipeline, and returns the statistics as JSON.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::cache::ContributionCache;
use crate::error::{Result, StreakError};
use crate::streak::{DEFAULT_GRACE_INTERVAL, compute_streaks};

pub struct AppState {
    pub cache: ContributionCache,
}

/// Raw query parameters of `/generate`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateParams {
    pub github_user: Option<String>,
    pub bonus_day_every: Option<String>,
}

/// Statistics handed to the badge renderer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreakSummary {
    pub user: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub grace_days_remaining: u32,
    pub grace_interval: u32,
    pub total_contributions: u64,
    pub last_refreshed_at: DateTime<Utc>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", get(generate_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Keep only `[A-Za-z0-9_-]`; nothing left is a validation error.
pub fn sanitize_user(raw: Option<&str>) -> Result<String> {
    let user: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if user.is_empty() {
        return Err(StreakError::Validation(
            "githubUser is missing or has no valid characters".to_string(),
        ));
    }
    Ok(user)
}

/// Keep only digits; absent or empty input falls back to the default interval.
pub fn sanitize_grace_interval(raw: Option<&str>) -> Result<u32> {
    let raw = match raw {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(DEFAULT_GRACE_INTERVAL),
    };

    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let interval: u32 = digits
        .parse()
        .map_err(|_| StreakError::Validation(format!("bonusDayEvery {:?} is not a number", raw)))?;

    if interval == 0 {
        return Err(StreakError::Validation(
            "bonusDayEvery must be at least 1".to_string(),
        ));
    }
    Ok(interval)
}

async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GenerateParams>,
) -> Result<Json<StreakSummary>> {
    let user = sanitize_user(params.github_user.as_deref())?;
    let grace_interval = sanitize_grace_interval(params.bonus_day_every.as_deref())?;

    let cached = state.cache.refresh(&user).await?;
    let streaks = compute_streaks(&cached.history.days, grace_interval)?;

    info!(
        user = %user,
        status = ?cached.status,
        cached = cached.persisted,
        current = streaks.current_streak,
        longest = streaks.longest_streak,
        grace = streaks.grace_days_remaining,
        "computed streak"
    );

    Ok(Json(StreakSummary {
        user,
        current_streak: streaks.current_streak,
        longest_streak: streaks.longest_streak,
        grace_days_remaining: streaks.grace_days_remaining,
        grace_interval,
        total_contributions: cached.history.total_contributions(),
        last_refreshed_at: cached.refreshed_at,
    }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
