//! Client-side session: the identity of the signed-in user, its placeholder
//! bearer token, and the persisted store holding both.
//!
//! The token is a local artifact shaped like a JWT. It is never verified here
//! and must never be logged; only its shape matters to this crate.

pub mod codec;
pub mod identity;
pub mod manager;
pub mod store;

pub use codec::{SessionToken, TokenClaims};
pub use identity::{Role, UserId, UserIdentity};
pub use manager::SessionManager;
pub use store::{SessionStore, StoreChange, StoreError, TOKEN_KEY, USER_KEY};
