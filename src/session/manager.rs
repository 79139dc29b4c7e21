//! Session operations used by views, guards and the CLI.
//!
//! Every operation is fail-open: store errors and unreadable records are
//! logged and read as "no session", so callers only ever see an anonymous user
//! or a `false`, never an error.

use super::codec::{self, SessionToken};
use super::identity::{Role, UserIdentity};
use super::store::{SessionStore, TOKEN_KEY, USER_KEY};
use crate::navigation::Navigator;
use crate::routes::LOGIN_ROUTE;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SessionManager {
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
    login_route: String,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: SessionStore, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            login_route: LOGIN_ROUTE.to_string(),
        }
    }

    #[must_use]
    pub fn with_login_route(mut self, login_route: &str) -> Self {
        self.login_route = login_route.to_string();
        self
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Stored identity, or `None` when missing or unreadable.
    #[must_use]
    pub fn current_user(&self) -> Option<UserIdentity> {
        read_identity(&self.store)
    }

    /// Raw stored token, well formed or not.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        read_key(&self.store, TOKEN_KEY)
    }

    /// Token and identity are both present, shape unchecked.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.current_user().is_some() && self.token().is_some()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some() && self.current_user().is_some() && self.validate_token()
    }

    /// Checks the stored token's shape and regenerates it from the stored
    /// identity when malformed. Regeneration counts as success.
    #[must_use]
    pub fn validate_token(&self) -> bool {
        let Some(token) = self.token() else {
            return false;
        };
        if read_key(&self.store, USER_KEY).is_none() {
            return false;
        }

        if codec::is_well_formed(Some(&token)) {
            return true;
        }

        debug!("stored token is malformed, regenerating");
        regenerate_token(&self.store).is_some()
    }

    /// `ADMIN` satisfies every role.
    #[must_use]
    pub fn has_role(&self, required: Role) -> bool {
        self.current_user()
            .is_some_and(|user| user.role == Role::Admin || user.role == required)
    }

    /// Default view for the signed-in user.
    #[must_use]
    pub fn landing_route(&self) -> Option<&'static str> {
        self.current_user().map(|user| user.role.landing_route())
    }

    /// Stores both halves of the session as given, in one store write. The
    /// token's shape is not checked here.
    pub fn login(&self, identity: &UserIdentity, token: &SessionToken) {
        let user = match serde_json::to_string(identity) {
            Ok(user) => user,
            Err(err) => {
                warn!("failed to serialize identity, session not stored: {err}");
                return;
            }
        };

        match self
            .store
            .set_all(&[(USER_KEY, user.as_str()), (TOKEN_KEY, token.expose())])
        {
            Ok(()) => info!(role = %identity.role, user = %identity.id, "session opened"),
            Err(err) => warn!("failed to write session state, session not stored: {err}"),
        }
    }

    /// Development login: synthesizes a token for `identity` and stores both.
    pub fn simulate_login(&self, role: Role, identity: UserIdentity) -> (SessionToken, UserIdentity) {
        let token = codec::encode(&identity);
        self.login(&identity, &token);
        info!(%role, "simulated login");
        (token, identity)
    }

    /// Clears the session and navigates to the login route.
    pub fn logout(&self) {
        clear_session(&self.store);
        info!("session closed");
        self.navigator.navigate(&self.login_route);
    }
}

/// Parses a stored identity record.
#[must_use]
pub fn decode_identity(raw: &str) -> Option<UserIdentity> {
    serde_json::from_str(raw).ok()
}

/// Reads and decodes the `user` key. Anything unreadable is treated as an
/// anonymous session.
pub(crate) fn read_identity(store: &SessionStore) -> Option<UserIdentity> {
    let raw = read_key(store, USER_KEY)?;
    match decode_identity(&raw) {
        Some(identity) => Some(identity),
        None => {
            warn!("stored identity is unreadable, treating session as anonymous");
            None
        }
    }
}

/// Encodes a new token from the stored identity and overwrites the stored
/// token. Returns `None` when there is no readable identity.
pub(crate) fn regenerate_token(store: &SessionStore) -> Option<SessionToken> {
    let identity = read_identity(store)?;
    let token = codec::encode(&identity);
    write_key(store, TOKEN_KEY, token.expose());
    debug!(user = %identity.id, "session token regenerated");
    Some(token)
}

/// Removes both halves of the session in one store write.
pub(crate) fn clear_session(store: &SessionStore) {
    if let Err(err) = store.remove_all(&[TOKEN_KEY, USER_KEY]) {
        warn!("failed to clear session state: {err}");
    }
}

pub(crate) fn read_key(store: &SessionStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(err) => {
            warn!("failed to read {key} from session state: {err}");
            None
        }
    }
}

fn write_key(store: &SessionStore, key: &str, value: &str) {
    if let Err(err) = store.set(key, value) {
        warn!("failed to write {key} to session state: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::HistoryNavigator;
    use crate::session::store::{MemoryBackend, StorageBackend, StoreError};
    use serde_json::json;
    use std::path::PathBuf;

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        read_only: std::sync::atomic::AtomicBool,
    }

    impl FlakyBackend {
        fn set_read_only(&self, read_only: bool) {
            self.read_only
                .store(read_only, std::sync::atomic::Ordering::SeqCst);
        }

        fn check_writable(&self) -> Result<(), StoreError> {
            if self.read_only.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Write {
                    path: PathBuf::from("session.json"),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            Ok(())
        }
    }

    impl StorageBackend for FlakyBackend {
        fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.load(key)
        }

        fn save(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
            self.check_writable()?;
            self.inner.save(entries)
        }

        fn delete(&self, keys: &[&str]) -> Result<Vec<String>, StoreError> {
            self.check_writable()?;
            self.inner.delete(keys)
        }
    }

    fn flaky_manager() -> (SessionManager, Arc<FlakyBackend>) {
        let backend = Arc::new(FlakyBackend::default());
        let manager = SessionManager::new(
            SessionStore::new(backend.clone()),
            Arc::new(HistoryNavigator::default()),
        );
        (manager, backend)
    }

    fn manager() -> (SessionManager, Arc<HistoryNavigator>) {
        let navigator = Arc::new(HistoryNavigator::new("/etudiant/dashboard"));
        let manager = SessionManager::new(SessionStore::in_memory(), navigator.clone());
        (manager, navigator)
    }

    fn store_user(manager: &SessionManager, user: &serde_json::Value) {
        manager
            .store()
            .set(USER_KEY, &user.to_string())
            .expect("failed to seed user");
    }

    fn count_dots(token: &str) -> usize {
        token.chars().filter(|c| *c == '.').count()
    }

    #[test]
    fn anonymous_by_default() {
        let (manager, _) = manager();
        assert!(manager.current_user().is_none());
        assert!(!manager.is_authenticated());
        assert!(!manager.is_logged_in());
        assert!(!manager.validate_token());
        for role in Role::ALL {
            assert!(!manager.has_role(role));
        }
    }

    #[test]
    fn login_roundtrips_identity() {
        let (manager, _) = manager();
        let identity = UserIdentity::demo(Role::Formateur);
        let token = codec::encode(&identity);

        manager.login(&identity, &token);

        assert_eq!(manager.current_user(), Some(identity));
        assert_eq!(manager.token().as_deref(), Some(token.expose()));
        assert!(manager.is_authenticated());
    }

    #[test]
    fn login_does_not_check_token_shape() {
        let (manager, _) = manager();
        manager.login(
            &UserIdentity::demo(Role::Etudiant),
            &SessionToken::new("opaque"),
        );
        assert_eq!(manager.token().as_deref(), Some("opaque"));
    }

    #[test]
    fn logout_clears_session_and_navigates_to_login() {
        let (manager, navigator) = manager();
        manager.simulate_login(Role::Etudiant, UserIdentity::demo(Role::Etudiant));
        assert!(manager.is_authenticated());

        manager.logout();

        assert!(manager.current_user().is_none());
        assert!(manager.token().is_none());
        assert!(!manager.is_authenticated());
        assert_eq!(navigator.visited(), vec!["/login".to_string()]);
    }

    #[test]
    fn login_roundtrips_identity_with_extra_fields() {
        let (manager, _) = manager();
        let identity = UserIdentity::new(9, Role::Formateur, "Martin", "Paul")
            .with_extra("role", "ADMIN")
            .with_extra("campus", "Nord");

        manager.login(&identity, &codec::encode(&identity));

        assert_eq!(manager.current_user(), Some(identity));
        assert!(manager.is_authenticated());
        assert!(!manager.has_role(Role::Admin));
    }

    #[test]
    fn failed_login_stores_neither_half() {
        let (manager, backend) = flaky_manager();
        backend.set_read_only(true);

        manager.simulate_login(Role::Etudiant, UserIdentity::demo(Role::Etudiant));

        assert!(manager.current_user().is_none());
        assert!(manager.token().is_none());
        assert!(!manager.is_logged_in());
    }

    #[test]
    fn failed_logout_keeps_both_halves() {
        let (manager, backend) = flaky_manager();
        manager.simulate_login(Role::Formateur, UserIdentity::demo(Role::Formateur));
        backend.set_read_only(true);

        manager.logout();

        assert!(manager.current_user().is_some());
        assert!(manager.token().is_some());

        backend.set_read_only(false);
        manager.logout();
        assert!(manager.current_user().is_none());
        assert!(manager.token().is_none());
    }

    #[test]
    fn validate_token_needs_a_user() {
        let (manager, _) = manager();
        manager
            .store()
            .set(TOKEN_KEY, "a.b.c")
            .expect("failed to seed token");
        assert!(!manager.validate_token());

        manager
            .store()
            .set(TOKEN_KEY, "not-a-jwt")
            .expect("failed to seed token");
        assert!(!manager.validate_token());
        assert_eq!(manager.token().as_deref(), Some("not-a-jwt"));
    }

    #[test]
    fn validate_token_heals_malformed_token() {
        let (manager, _) = manager();
        store_user(
            &manager,
            &json!({"id": 1, "role": "ETUDIANT", "nom": "A", "prenom": "B"}),
        );
        manager
            .store()
            .set(TOKEN_KEY, "not-a-jwt")
            .expect("failed to seed token");

        assert!(manager.validate_token());

        let healed = manager.token().expect("token should be stored");
        assert_eq!(count_dots(&healed), 2);
        let claims = codec::decode_claims(&healed).expect("claims should decode");
        assert_eq!(claims.sub, "1");
        assert_eq!(claims.name, "B A");
    }

    #[test]
    fn validate_token_keeps_well_formed_token() {
        let (manager, _) = manager();
        store_user(&manager, &json!({"id": 1, "role": "ETUDIANT"}));
        manager
            .store()
            .set(TOKEN_KEY, "x.y.z")
            .expect("failed to seed token");

        assert!(manager.validate_token());
        assert_eq!(manager.token().as_deref(), Some("x.y.z"));
    }

    #[test]
    fn unreadable_identity_is_anonymous() {
        let (manager, _) = manager();
        manager
            .store()
            .set(USER_KEY, "{not json")
            .expect("failed to seed user");
        manager
            .store()
            .set(TOKEN_KEY, "not-a-jwt")
            .expect("failed to seed token");

        assert!(manager.current_user().is_none());
        assert!(!manager.is_authenticated());
        // No identity to regenerate from.
        assert!(!manager.validate_token());
    }

    #[test]
    fn admin_has_every_role() {
        let (manager, _) = manager();
        manager.simulate_login(Role::Admin, UserIdentity::demo(Role::Admin));
        for role in Role::ALL {
            assert!(manager.has_role(role));
        }
    }

    #[test]
    fn student_has_only_student_role() {
        let (manager, _) = manager();
        manager.simulate_login(Role::Etudiant, UserIdentity::demo(Role::Etudiant));
        assert!(manager.has_role(Role::Etudiant));
        assert!(!manager.has_role(Role::Formateur));
        assert!(!manager.has_role(Role::Admin));
        assert_eq!(manager.landing_route(), Some("/etudiant/dashboard"));
    }

    #[test]
    fn simulate_login_returns_stored_pair() {
        let (manager, _) = manager();
        let (token, identity) =
            manager.simulate_login(Role::Formateur, UserIdentity::demo(Role::Formateur));
        assert!(token.is_well_formed());
        assert_eq!(manager.token().as_deref(), Some(token.expose()));
        assert_eq!(manager.current_user(), Some(identity));
    }

    #[test]
    fn decode_identity_is_explicit_about_failures() {
        assert!(decode_identity("").is_none());
        assert!(decode_identity(r#"{"id":1,"role":"DIRECTEUR"}"#).is_none());
        assert_eq!(
            decode_identity(r#"{"id":1,"role":"ADMIN"}"#).map(|user| user.role),
            Some(Role::Admin)
        );
    }
}
