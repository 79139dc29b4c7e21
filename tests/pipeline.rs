use anyhow::{ensure, Context, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    Router,
};
use scolaris::{
    api::{ApiClient, ApiError, Lookup, PipelineConfig, Resource},
    navigation::{HistoryNavigator, Navigator},
    session::{codec, Role, SessionManager, SessionStore, UserIdentity, TOKEN_KEY, USER_KEY},
};
use serde_json::{json, Value};
use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

const REDIRECT_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
struct Seen {
    path: String,
    authorization: Option<String>,
    request_id: Option<String>,
}

/// Backend double: answers from a script, then with `200 []`.
#[derive(Default)]
struct MockBackend {
    script: Mutex<VecDeque<(StatusCode, String)>>,
    seen: Mutex<Vec<Seen>>,
}

impl MockBackend {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

async fn answer(
    State(mock): State<Arc<MockBackend>>,
    headers: HeaderMap,
    uri: Uri,
) -> (StatusCode, String) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    if let Ok(mut seen) = mock.seen.lock() {
        seen.push(Seen {
            path: uri.path().to_string(),
            authorization: header("authorization"),
            request_id: header("x-request-id"),
        });
    }
    mock.script
        .lock()
        .ok()
        .and_then(|mut script| script.pop_front())
        .unwrap_or_else(|| (StatusCode::OK, "[]".to_string()))
}

struct Harness {
    mock: Arc<MockBackend>,
    store: SessionStore,
    navigator: Arc<HistoryNavigator>,
    client: ApiClient,
}

impl Harness {
    fn with_backend(addr: SocketAddr, mock: Arc<MockBackend>, location: &str) -> Result<Self> {
        let store = SessionStore::in_memory();
        let navigator = Arc::new(HistoryNavigator::new(location));
        let client = ApiClient::new(
            Url::parse(&format!("http://{addr}/api"))?,
            store.clone(),
            navigator.clone(),
            PipelineConfig::new("/login", REDIRECT_DELAY, "JWT|token")?,
        )?;

        Ok(Self {
            mock,
            store,
            navigator,
            client,
        })
    }

    async fn start(location: &str, script: Vec<(StatusCode, &str)>) -> Result<Self> {
        let mock = Arc::new(MockBackend {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            ),
            seen: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(answer).with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self::with_backend(addr, mock, location)
    }

    fn session(&self) -> SessionManager {
        SessionManager::new(self.store.clone(), self.navigator.clone())
    }

    fn sign_in(&self, role: Role) -> String {
        let (token, _) = self.session().simulate_login(role, UserIdentity::demo(role));
        token.expose().to_string()
    }

    fn stored(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.get(key)?)
    }
}

#[tokio::test]
async fn anonymous_requests_carry_no_authorization() -> Result<()> {
    let harness = Harness::start("/", vec![]).await?;

    let body: Value = harness.client.get_json("/cours").await?;
    ensure!(body == json!([]), "unexpected body: {body}");

    let seen = harness.mock.seen();
    ensure!(seen.len() == 1, "expected one request, got {}", seen.len());
    ensure!(seen[0].path == "/api/cours", "unexpected path {}", seen[0].path);
    ensure!(seen[0].authorization.is_none(), "authorization sent");
    ensure!(seen[0].request_id.is_some(), "request id missing");
    Ok(())
}

#[tokio::test]
async fn signed_in_requests_carry_the_bearer_token() -> Result<()> {
    let harness = Harness::start("/etudiant/cours", vec![]).await?;
    let token = harness.sign_in(Role::Etudiant);

    harness.client.list(Resource::Courses).await?;

    let seen = harness.mock.seen();
    ensure!(
        seen[0].authorization.as_deref() == Some(format!("Bearer {token}").as_str()),
        "bearer token not attached"
    );
    Ok(())
}

#[tokio::test]
async fn token_failure_is_retried_once_with_a_fresh_token() -> Result<()> {
    let harness = Harness::start(
        "/etudiant/cours",
        vec![(StatusCode::FORBIDDEN, "JWT expired")],
    )
    .await?;
    harness.sign_in(Role::Etudiant);

    let body: Value = harness
        .client
        .find(Resource::Grades, &Lookup::Mine)
        .await?;
    ensure!(body == json!([]), "retry result not delivered: {body}");

    let seen = harness.mock.seen();
    ensure!(seen.len() == 2, "expected a single retry, got {} hits", seen.len());
    ensure!(seen[1].path == "/api/notes/mes-notes", "retry hit {}", seen[1].path);
    let retried = seen[1]
        .authorization
        .as_deref()
        .and_then(|value| value.strip_prefix("Bearer "))
        .context("retry carried no bearer token")?;
    ensure!(codec::is_well_formed(Some(retried)), "retry token malformed");
    ensure!(
        seen[0].request_id == seen[1].request_id,
        "retry should keep the request id"
    );

    // The session survives a recovered failure.
    ensure!(harness.stored(TOKEN_KEY)?.is_some(), "token was cleared");
    harness.client.settle().await;
    ensure!(harness.navigator.visited().is_empty(), "unexpected redirect");
    Ok(())
}

#[tokio::test]
async fn failed_retry_ends_the_session() -> Result<()> {
    let harness = Harness::start(
        "/formateur/cours",
        vec![
            (StatusCode::UNAUTHORIZED, "invalid token"),
            (StatusCode::UNAUTHORIZED, "invalid token"),
            (StatusCode::UNAUTHORIZED, "invalid token"),
        ],
    )
    .await?;
    harness.sign_in(Role::Formateur);

    let result = harness.client.list(Resource::Sessions).await;
    ensure!(
        matches!(&result, Err(ApiError::Http { status: 401, .. })),
        "expected the retry's 401, got {result:?}"
    );
    ensure!(harness.mock.seen().len() == 2, "retried more than once");

    ensure!(harness.stored(TOKEN_KEY)?.is_none(), "token kept");
    ensure!(harness.stored(USER_KEY)?.is_none(), "user kept");

    harness.client.settle().await;
    ensure!(
        harness.navigator.visited() == vec!["/login".to_string()],
        "expected one redirect, got {:?}",
        harness.navigator.visited()
    );
    Ok(())
}

#[tokio::test]
async fn other_auth_failures_clear_the_session_and_redirect_once() -> Result<()> {
    let harness = Harness::start(
        "/etudiant/dashboard",
        vec![(StatusCode::UNAUTHORIZED, "Access denied")],
    )
    .await?;
    harness.sign_in(Role::Etudiant);

    let result = harness.client.list(Resource::Groups).await;
    ensure!(
        result
            .as_ref()
            .err()
            .is_some_and(ApiError::is_auth_failure),
        "expected an auth failure, got {result:?}"
    );
    ensure!(harness.mock.seen().len() == 1, "no retry expected");
    ensure!(harness.stored(TOKEN_KEY)?.is_none(), "token kept");
    ensure!(harness.stored(USER_KEY)?.is_none(), "user kept");

    // The redirect is delayed, not immediate.
    ensure!(
        harness.navigator.current_path() == "/etudiant/dashboard",
        "redirected before the delay"
    );
    harness.client.settle().await;
    ensure!(harness.navigator.current_path() == "/login", "not redirected");
    ensure!(harness.navigator.visited().len() == 1, "redirected twice");
    Ok(())
}

#[tokio::test]
async fn token_failure_without_identity_is_not_retried() -> Result<()> {
    let harness =
        Harness::start("/etudiant/cours", vec![(StatusCode::FORBIDDEN, "JWT missing")]).await?;
    harness.store.set(TOKEN_KEY, "a.b.c")?;

    let result = harness.client.list(Resource::Courses).await;
    ensure!(result.is_err(), "expected failure");
    ensure!(harness.mock.seen().len() == 1, "retried without an identity");
    ensure!(harness.stored(TOKEN_KEY)?.is_none(), "token kept");

    harness.client.settle().await;
    ensure!(harness.navigator.current_path() == "/login", "not redirected");
    Ok(())
}

#[tokio::test]
async fn no_redirect_when_already_on_login() -> Result<()> {
    let harness =
        Harness::start("/login", vec![(StatusCode::UNAUTHORIZED, "Access denied")]).await?;
    harness.sign_in(Role::Admin);

    let result = harness.client.list(Resource::Students).await;
    ensure!(result.is_err(), "expected failure");
    ensure!(harness.stored(TOKEN_KEY)?.is_none(), "token kept");

    harness.client.settle().await;
    ensure!(harness.navigator.visited().is_empty(), "redirected from login");
    Ok(())
}

#[tokio::test]
async fn other_statuses_pass_through() -> Result<()> {
    let harness = Harness::start(
        "/formateur/cours",
        vec![
            (StatusCode::NOT_FOUND, "Cours introuvable"),
            (StatusCode::INTERNAL_SERVER_ERROR, ""),
        ],
    )
    .await?;
    let token = harness.sign_in(Role::Formateur);

    let missing = harness
        .client
        .find(Resource::Courses, &Lookup::Id("99".to_string()))
        .await;
    ensure!(
        missing
            == Err(ApiError::Http {
                status: 404,
                message: "Cours introuvable".to_string()
            }),
        "unexpected result {missing:?}"
    );

    let broken = harness.client.list(Resource::Courses).await;
    ensure!(
        broken
            == Err(ApiError::Http {
                status: 500,
                message: "Request failed.".to_string()
            }),
        "unexpected result {broken:?}"
    );

    ensure!(harness.mock.seen().len() == 2, "errors were retried");
    ensure!(
        harness.stored(TOKEN_KEY)?.as_deref() == Some(token.as_str()),
        "session touched by a non-auth failure"
    );
    harness.client.settle().await;
    ensure!(harness.navigator.visited().is_empty(), "unexpected redirect");
    Ok(())
}

#[tokio::test]
async fn malformed_token_is_healed_before_dispatch() -> Result<()> {
    let harness = Harness::start("/etudiant/cours", vec![]).await?;
    harness.sign_in(Role::Etudiant);
    harness.store.set(TOKEN_KEY, "not-a-jwt")?;

    harness.client.list(Resource::Specialties).await?;

    let stored = harness.stored(TOKEN_KEY)?.context("token missing")?;
    ensure!(codec::is_well_formed(Some(&stored)), "token not regenerated");
    let seen = harness.mock.seen();
    ensure!(
        seen[0].authorization.as_deref() == Some(format!("Bearer {stored}").as_str()),
        "healed token not sent"
    );
    Ok(())
}

#[tokio::test]
async fn lookups_hit_the_backend_paths() -> Result<()> {
    let harness = Harness::start(
        "/formateur/etudiants",
        vec![(StatusCode::OK, r#"{"id":1,"matricule":"ETU001"}"#)],
    )
    .await?;
    harness.sign_in(Role::Formateur);

    let student = harness
        .client
        .find(Resource::Students, &Lookup::Matricule("ETU001".to_string()))
        .await?;
    ensure!(student["matricule"] == "ETU001", "unexpected body {student}");

    harness
        .client
        .find(Resource::Sessions, &Lookup::Upcoming)
        .await?;

    let paths: Vec<String> = harness.mock.seen().into_iter().map(|seen| seen.path).collect();
    ensure!(
        paths
            == vec![
                "/api/etudiants/matricule/ETU001".to_string(),
                "/api/seances-cours/a-venir".to_string()
            ],
        "unexpected paths {paths:?}"
    );
    Ok(())
}

#[tokio::test]
async fn unreadable_auth_failure_still_ends_the_session() -> Result<()> {
    // Announces a longer body than it sends, then hangs up.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0_u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket
                .write_all(b"HTTP/1.1 401 Unauthorized\r\ncontent-length: 64\r\n\r\nJWT exp")
                .await;
            let _ = socket.shutdown().await;
        }
    });

    let harness = Harness::with_backend(addr, Arc::new(MockBackend::default()), "/etudiant/cours")?;
    harness.sign_in(Role::Etudiant);

    let result = harness.client.list(Resource::Courses).await;
    ensure!(
        matches!(&result, Err(ApiError::Http { status: 401, .. })),
        "expected the 401 to surface, got {result:?}"
    );
    ensure!(harness.stored(TOKEN_KEY)?.is_none(), "token kept");
    ensure!(harness.stored(USER_KEY)?.is_none(), "user kept");

    harness.client.settle().await;
    ensure!(harness.navigator.current_path() == "/login", "not redirected");
    Ok(())
}
