use crate::{
    api::ApiClient,
    cli::commands::{
        ARG_API_URL, ARG_AUTH_FAILURE_PATTERN, ARG_LOCATION, ARG_LOGIN_ROUTE,
        ARG_REDIRECT_DELAY_MS, ARG_STATE_FILE,
    },
    config::{AppConfig, ConfigOverrides},
    navigation::{HistoryNavigator, Navigator},
    routes::RouteGuard,
    session::{SessionManager, SessionStore},
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: AppConfig,
}

impl GlobalArgs {
    /// # Errors
    /// Returns an error if the configuration values are invalid.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let overrides = ConfigOverrides {
            api_base_url: matches.get_one::<String>(ARG_API_URL).cloned(),
            state_file: matches.get_one::<String>(ARG_STATE_FILE).cloned(),
            login_route: matches.get_one::<String>(ARG_LOGIN_ROUTE).cloned(),
            redirect_delay_ms: matches.get_one::<u64>(ARG_REDIRECT_DELAY_MS).copied(),
            auth_failure_pattern: matches.get_one::<String>(ARG_AUTH_FAILURE_PATTERN).cloned(),
            location: matches.get_one::<String>(ARG_LOCATION).cloned(),
        };

        Ok(Self {
            config: AppConfig::load(overrides)?,
        })
    }

    /// Opens the persisted session and wires the components around it.
    ///
    /// # Errors
    /// Returns an error if the state file cannot be read or the HTTP client
    /// cannot be built.
    pub fn connect(&self) -> Result<Runtime> {
        let store = SessionStore::open(&self.config.state_file).with_context(|| {
            format!(
                "failed to open session state: {}",
                self.config.state_file.display()
            )
        })?;
        let navigator = Arc::new(HistoryNavigator::new(&self.config.location));
        let session = SessionManager::new(store.clone(), navigator.clone())
            .with_login_route(&self.config.login_route);
        let guard = RouteGuard::new(session.clone()).with_login_route(&self.config.login_route);
        let client = ApiClient::from_config(&self.config, store, navigator.clone())?;

        Ok(Runtime {
            navigator,
            session,
            guard,
            client,
        })
    }
}

/// Components of one CLI invocation, all sharing the same store and location.
pub struct Runtime {
    pub navigator: Arc<HistoryNavigator>,
    pub session: SessionManager,
    pub guard: RouteGuard,
    pub client: ApiClient,
}

impl Runtime {
    /// Location after every navigation performed so far.
    #[must_use]
    pub fn location(&self) -> String {
        self.navigator.current_path()
    }
}
