//! # Scolaris (school management client core)
//!
//! `scolaris` holds the client side of a school-management application: who is
//! signed in, how requests to the REST backend are authenticated, and which
//! protected views a user may open. Rendering is left to callers; the bundled
//! CLI is one of them.
//!
//! ## Session
//!
//! A session is the pair (token, identity) persisted in a key/value
//! [`session::SessionStore`] under the `token` and `user` keys. Both halves are
//! written together and cleared together.
//!
//! - **Tokens** are locally synthesized placeholders shaped like a JWT
//!   (`header.payload.signature`). Only the shape is checked; a malformed token
//!   is regenerated from the stored identity instead of being rejected.
//! - **Fail-open:** reading the session never errors. Unreadable or missing
//!   state degrades to "anonymous".
//!
//! ## API pipeline
//!
//! [`api::ApiClient`] attaches `Authorization: Bearer <token>` to every request
//! when a token is available. A `401`/`403` whose body points at the token is
//! retried once with a fresh token; any other authentication failure clears the
//! session and sends the user back to the login route.
//!
//! ## Roles
//!
//! `ETUDIANT`, `FORMATEUR` and `ADMIN`. `ADMIN` satisfies every role check in
//! [`session::SessionManager::has_role`]; route access lists name it explicitly.

pub mod api;
pub mod cli;
pub mod config;
pub mod navigation;
pub mod routes;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
