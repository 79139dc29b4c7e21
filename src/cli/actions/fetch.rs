use crate::api::{ApiError, Lookup, Resource};
use crate::cli::globals::Runtime;
use anyhow::Result;
use serde_json::{json, Value};
use tracing::debug;

/// GET `path` through the authenticated pipeline.
///
/// # Errors
/// Returns an error if the request fails after the pipeline gave up.
pub async fn get(runtime: &Runtime, path: &str) -> Result<Value> {
    let result = runtime.client.get_json::<Value>(path).await;
    report(runtime, result).await
}

/// Fetch a collection, or a lookup on it.
///
/// # Errors
/// Returns an error if the lookup does not apply to `resource` or the
/// request fails.
pub async fn list(runtime: &Runtime, resource: Resource, lookup: Option<&Lookup>) -> Result<Value> {
    let result = match lookup {
        Some(lookup) => runtime.client.find(resource, lookup).await,
        None => runtime.client.list(resource).await,
    };
    report(runtime, result).await
}

/// Lets any scheduled login redirect fire before the process reports where
/// the user ended up.
async fn report(runtime: &Runtime, result: Result<Value, ApiError>) -> Result<Value> {
    runtime.client.settle().await;
    let location = runtime.location();
    match result {
        Ok(data) => Ok(json!({ "data": data, "location": location })),
        Err(err) => {
            debug!(%location, "request failed");
            Err(anyhow::Error::new(err).context(format!("request failed, now at {location}")))
        }
    }
}
