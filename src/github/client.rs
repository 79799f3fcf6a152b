// GitHub GraphQL HTTP client.
// Handles authentication, timeouts, rate limiting, and response/error unwrapping.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::error::{Result, StreakError};

use super::types::{GraphQlRequest, GraphQlResponse, RateLimit};

pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub GraphQL client with authentication and rate limit tracking.
pub struct GitHubClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    rate_limit: Mutex<RateLimit>,
}

impl GitHubClient {
    /// Create a GitHub client for `endpoint` with the given token and request timeout.
    pub fn with_options(token: &str, endpoint: &str, timeout: Duration) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(StreakError::MissingToken);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| StreakError::Unauthorized)?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("commit-streak"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(StreakError::Api)?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Snapshot of the most recent rate limit information.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Execute a GraphQL query and return its `data` payload.
    pub async fn query<V, T>(&self, query: &str, variables: V) -> Result<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let request = GraphQlRequest { query, variables };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.update_rate_limit(&response);
        let response = self.check_response(response).await?;

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let envelope: GraphQlResponse<T> =
            serde_json::from_slice(&body).map_err(StreakError::Payload)?;
        envelope.into_data()
    }

    fn classify(&self, error: reqwest::Error) -> StreakError {
        if error.is_timeout() {
            StreakError::Timeout(self.timeout)
        } else {
            StreakError::Api(error)
        }
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let header = |name: &str| -> Option<u64> {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        };

        let Ok(mut rate_limit) = self.rate_limit.lock() else {
            return;
        };
        if let Some(limit) = header("x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header("x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header("x-ratelimit-reset") {
            rate_limit.reset = reset;
        }
        debug!(
            remaining = rate_limit.remaining,
            limit = rate_limit.limit,
            "github rate limit"
        );
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::UNAUTHORIZED => Err(StreakError::Unauthorized),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                let rate_limit = self.rate_limit();
                if rate_limit.remaining == 0 && rate_limit.reset > 0 {
                    let reset_at = chrono::DateTime::from_timestamp(rate_limit.reset as i64, 0)
                        .map(|dt| dt.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    Err(StreakError::RateLimited { reset_at })
                } else {
                    Err(StreakError::Http {
                        status: response.status().as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    })
                }
            }
            status => Err(StreakError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use axum::{Json, Router, http::HeaderMap as RequestHeaders, routing::post};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use crate::contributions::ContributionSource;
    use crate::github::types::YearsData;

    fn client(token: &str) -> Result<GitHubClient> {
        GitHubClient::with_options(token, GITHUB_GRAPHQL_URL, DEFAULT_TIMEOUT)
    }

    /// Serve `app` on an ephemeral local port and return its GraphQL URL.
    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/graphql")
    }

    async fn github_at(app: Router, timeout: Duration) -> GitHubClient {
        let endpoint = serve(app).await;
        GitHubClient::with_options("ghp_test", &endpoint, timeout).unwrap()
    }

    async fn years_query(github: &GitHubClient) -> Result<YearsData> {
        github.query("query { viewer { login } }", json!({})).await
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(client(""), Err(StreakError::MissingToken)));
        assert!(matches!(client("   "), Err(StreakError::MissingToken)));
    }

    #[test]
    fn test_token_with_newline_rejected() {
        assert!(matches!(
            client("abc\ndef"),
            Err(StreakError::Unauthorized)
        ));
    }

    #[test]
    fn test_new_client_has_empty_rate_limit() {
        let github = client("ghp_test").unwrap();
        let rate_limit = github.rate_limit();
        assert_eq!(rate_limit.limit, 0);
        assert_eq!(rate_limit.remaining, 0);
    }

    #[tokio::test]
    async fn test_query_sends_token_and_variables() {
        let app = Router::new().route(
            "/graphql",
            post(|headers: RequestHeaders, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer ghp_test");
                if !authorized || body["variables"]["user"] != "octocat" {
                    return (StatusCode::BAD_REQUEST, Json(json!({})));
                }
                let data = json!({"data": {"user": {"contributionsCollection": {
                    "contributionYears": [2024, 2022]
                }}}});
                (StatusCode::OK, Json(data))
            }),
        );
        let github = github_at(app, DEFAULT_TIMEOUT).await;

        let years = github.list_contribution_years("octocat").await.unwrap();
        assert_eq!(years, BTreeSet::from([2022, 2024]));
    }

    #[tokio::test]
    async fn test_unauthorized_status() {
        let app = Router::new().route("/graphql", post(|| async { StatusCode::UNAUTHORIZED }));
        let github = github_at(app, DEFAULT_TIMEOUT).await;

        let err = years_query(&github).await.unwrap_err();
        assert!(matches!(err, StreakError::Unauthorized));
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit() {
        let app = Router::new().route(
            "/graphql",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    [
                        ("x-ratelimit-limit", "5000"),
                        ("x-ratelimit-remaining", "0"),
                        ("x-ratelimit-reset", "1700000000"),
                    ],
                    "API rate limit exceeded",
                )
            }),
        );
        let github = github_at(app, DEFAULT_TIMEOUT).await;

        match years_query(&github).await {
            Err(StreakError::RateLimited { reset_at }) => assert_eq!(reset_at, "22:13:20"),
            other => panic!("expected RateLimited, got {other:?}"),
        }
        let rate_limit = github.rate_limit();
        assert_eq!(rate_limit.limit, 5000);
        assert_eq!(rate_limit.remaining, 0);
    }

    #[tokio::test]
    async fn test_too_many_requests_with_budget_is_http_error() {
        let app = Router::new().route(
            "/graphql",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("x-ratelimit-remaining", "12")],
                    "slow down",
                )
            }),
        );
        let github = github_at(app, DEFAULT_TIMEOUT).await;

        match years_query(&github).await {
            Err(StreakError::Http { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected Http, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let app = Router::new().route(
            "/graphql",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "{}"
            }),
        );
        let timeout = Duration::from_millis(100);
        let github = github_at(app, timeout).await;

        match years_query(&github).await {
            Err(StreakError::Timeout(after)) => assert_eq!(after, timeout),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_payload_error() {
        let app = Router::new().route("/graphql", post(|| async { "<html>oops</html>" }));
        let github = github_at(app, DEFAULT_TIMEOUT).await;

        let err = years_query(&github).await.unwrap_err();
        assert!(matches!(err, StreakError::Payload(_)));
    }

    #[tokio::test]
    async fn test_graphql_not_found_is_unknown_user() {
        let app = Router::new().route(
            "/graphql",
            post(|| async {
                Json(json!({
                    "data": {"user": null},
                    "errors": [{"type": "NOT_FOUND", "message": "Could not resolve to a User"}]
                }))
            }),
        );
        let github = github_at(app, DEFAULT_TIMEOUT).await;

        let err = github.list_contribution_years("nobody").await.unwrap_err();
        assert!(matches!(err, StreakError::UserNotFound(_)));
    }
}
