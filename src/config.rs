//! Client configuration: backend location, where the session is persisted, and
//! the knobs of the authentication pipeline. Defaults match a local backend;
//! every value can be overridden from the command line or the environment.
//! Configuration values are public; do not store secrets here.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::{path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_LOGIN_ROUTE: &str = crate::routes::LOGIN_ROUTE;
pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 100;
/// Case-sensitive markers of a token problem in a 401/403 body.
pub const DEFAULT_AUTH_FAILURE_PATTERN: &str = "JWT|token";
const STATE_FILE_NAME: &str = "session.json";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_base_url: Url,
    pub state_file: PathBuf,
    pub login_route: String,
    pub redirect_delay: Duration,
    pub auth_failure_pattern: String,
    pub location: String,
}

/// Raw override values as they arrive from the CLI or the environment.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub state_file: Option<String>,
    pub login_route: Option<String>,
    pub redirect_delay_ms: Option<u64>,
    pub auth_failure_pattern: Option<String>,
    pub location: Option<String>,
}

impl AppConfig {
    /// Builds the configuration from defaults plus the provided overrides.
    ///
    /// # Errors
    /// Returns an error if the API base URL is not a valid absolute URL.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let api_base_url = overrides
            .api_base_url
            .as_deref()
            .and_then(normalize_value)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = Url::parse(&api_base_url)
            .with_context(|| format!("invalid API base URL: {api_base_url}"))?;

        let state_file = overrides
            .state_file
            .as_deref()
            .and_then(normalize_value)
            .map_or_else(default_state_file, PathBuf::from);

        let login_route = overrides
            .login_route
            .as_deref()
            .and_then(normalize_value)
            .map_or_else(|| DEFAULT_LOGIN_ROUTE.to_string(), |route| normalize_route(&route));

        let location = overrides
            .location
            .as_deref()
            .and_then(normalize_value)
            .map_or_else(|| "/".to_string(), |route| normalize_route(&route));

        Ok(Self {
            api_base_url,
            state_file,
            login_route,
            redirect_delay: Duration::from_millis(
                overrides.redirect_delay_ms.unwrap_or(DEFAULT_REDIRECT_DELAY_MS),
            ),
            auth_failure_pattern: overrides
                .auth_failure_pattern
                .as_deref()
                .and_then(normalize_value)
                .unwrap_or_else(|| DEFAULT_AUTH_FAILURE_PATTERN.to_string()),
            location,
        })
    }
}

/// Platform data directory, or the working directory when none is known.
#[must_use]
pub fn default_state_file() -> PathBuf {
    ProjectDirs::from("dev", "scolaris", "scolaris").map_or_else(
        || PathBuf::from(".scolaris").join(STATE_FILE_NAME),
        |dirs| dirs.data_local_dir().join(STATE_FILE_NAME),
    )
}

fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_route(route: &str) -> String {
    if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    }
}
