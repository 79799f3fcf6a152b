// Service configuration.
// Loads the GitHub token, listen address, cache location, and timing knobs from the environment.

use std::{
    env,
    fmt::{self, Display},
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use tracing::{info, warn};

use crate::cache::{DEFAULT_FRESHNESS_WINDOW, paths};
use crate::error::{Result, StreakError};
use crate::github::client::{DEFAULT_TIMEOUT, GITHUB_GRAPHQL_URL};

const FALLBACK_CACHE_DIR: &str = "./streak-cache";

#[derive(Clone)]
pub struct Config {
    pub github_token: String,
    pub graphql_url: String,
    pub listen_addr: SocketAddr,
    pub cache_dir: PathBuf,
    pub freshness_window: Duration,
    pub fetch_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("github_token", &"<redacted>")
            .field("graphql_url", &self.graphql_url)
            .field("listen_addr", &self.listen_addr)
            .field("cache_dir", &self.cache_dir)
            .field("freshness_window", &self.freshness_window)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let github_token = lookup("GITHUB_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(StreakError::MissingToken)?;

        let cache_dir = match lookup("STREAK_CACHE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => paths::cache_dir().unwrap_or_else(|| {
                warn!("No platform cache directory, using {FALLBACK_CACHE_DIR}");
                PathBuf::from(FALLBACK_CACHE_DIR)
            }),
        };

        Ok(Self {
            github_token,
            graphql_url: lookup("GITHUB_GRAPHQL_URL")
                .unwrap_or_else(|| GITHUB_GRAPHQL_URL.to_string()),
            listen_addr: try_load(&lookup, "STREAK_LISTEN_ADDR", "0.0.0.0:8080")?,
            cache_dir,
            freshness_window: Duration::from_secs(try_load(
                &lookup,
                "STREAK_FRESHNESS_SECS",
                &DEFAULT_FRESHNESS_WINDOW.as_secs().to_string(),
            )?),
            fetch_timeout: Duration::from_secs(try_load(
                &lookup,
                "STREAK_FETCH_TIMEOUT_SECS",
                &DEFAULT_TIMEOUT.as_secs().to_string(),
            )?),
        })
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| StreakError::Config(format!("invalid {key} value: {e}")))
}
