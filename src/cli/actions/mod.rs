pub mod fetch;
pub mod route;
pub mod session;

use crate::api::{Lookup, Resource};
use crate::cli::globals::GlobalArgs;
use anyhow::Result;
use serde_json::Value;

#[derive(Debug)]
pub enum Action {
    Login(session::LoginArgs),
    Logout,
    Whoami,
    Validate,
    Callback,
    Route {
        path: String,
    },
    Get {
        path: String,
    },
    List {
        resource: Resource,
        lookup: Option<Lookup>,
    },
}

impl Action {
    /// Execute the action and print its report as JSON on stdout.
    ///
    /// # Errors
    /// Returns an error if the session state cannot be opened or a backend
    /// request fails.
    pub async fn execute(self, globals: &GlobalArgs) -> Result<()> {
        let report = self.run(globals).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    /// Execute the action and return its report.
    ///
    /// # Errors
    /// Same as [`Self::execute`].
    pub async fn run(self, globals: &GlobalArgs) -> Result<Value> {
        let runtime = globals.connect()?;
        match self {
            Self::Login(args) => Ok(session::login(&runtime, args)),
            Self::Logout => Ok(session::logout(&runtime)),
            Self::Whoami => Ok(session::whoami(&runtime)),
            Self::Validate => Ok(session::validate(&runtime)),
            Self::Callback => Ok(route::callback(&runtime)),
            Self::Route { path } => Ok(route::check(&runtime, &path)),
            Self::Get { path } => fetch::get(&runtime, &path).await,
            Self::List { resource, lookup } => {
                fetch::list(&runtime, resource, lookup.as_ref()).await
            }
        }
    }
}
