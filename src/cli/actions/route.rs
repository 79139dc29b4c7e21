use crate::cli::globals::Runtime;
use crate::navigation::Navigator;
use crate::routes::{access_for, normalize, GuardDecision, RouteAccess};
use serde_json::{json, Value};

/// Runs the guard for `path` and follows the decision, like a router would.
pub fn check(runtime: &Runtime, path: &str) -> Value {
    let path = normalize(path);
    let decision = runtime.guard.navigate(&path);
    let (rendered, location) = match &decision {
        GuardDecision::Render => {
            runtime.navigator.navigate(&path);
            (true, path.clone())
        }
        GuardDecision::Redirect(target) => {
            runtime.navigator.navigate(target);
            (false, target.clone())
        }
    };

    let required = match access_for(&path) {
        RouteAccess::Protected(roles) => Some(roles),
        RouteAccess::Public | RouteAccess::Unknown => None,
    };

    json!({
        "path": path,
        "render": rendered,
        "required_roles": required,
        "location": location,
    })
}

/// Post-login callback: sends the user to their landing route.
pub fn callback(runtime: &Runtime) -> Value {
    let authenticated = runtime.session.is_authenticated();
    let target = runtime.guard.callback_target();
    runtime.navigator.navigate(&target);
    json!({
        "authenticated": authenticated,
        "location": runtime.location(),
    })
}
