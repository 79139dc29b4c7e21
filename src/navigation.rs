//! Navigation side effects.
//!
//! The session core never renders anything; when it has to move the user (on
//! logout, or after an unrecoverable authentication failure) it asks a
//! [`Navigator`]. Front ends plug in their router, the CLI and the tests use
//! [`HistoryNavigator`].

use std::sync::{PoisonError, RwLock};
use tracing::info;

pub trait Navigator: Send + Sync {
    /// Path of the view currently shown.
    fn current_path(&self) -> String;

    /// Full navigation to `path`; there is no way back into the caller.
    fn navigate(&self, path: &str);
}

/// In-memory location with the list of every navigation performed.
#[derive(Debug)]
pub struct HistoryNavigator {
    state: RwLock<History>,
}

#[derive(Debug)]
struct History {
    current: String,
    visited: Vec<String>,
}

impl HistoryNavigator {
    #[must_use]
    pub fn new(initial_path: &str) -> Self {
        Self {
            state: RwLock::new(History {
                current: initial_path.to_string(),
                visited: Vec::new(),
            }),
        }
    }

    /// Paths navigated to, oldest first. The initial path is not included.
    #[must_use]
    pub fn visited(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.visited.clone()
    }
}

impl Default for HistoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for HistoryNavigator {
    fn current_path(&self) -> String {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.current.clone()
    }

    fn navigate(&self, path: &str) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        info!(from = %state.current, to = path, "navigating");
        state.current = path.to_string();
        state.visited.push(path.to_string());
    }
}
