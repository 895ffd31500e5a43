use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::identity::{AuthSession, Identity};
use super::state::{SessionState, StoredTokens};
use super::store::{HistoryRecord, NewHistoryRecord, SessionStore};
use crate::constants::HTTP_REQUEST_TIMEOUT_SECS;
use crate::utils::{ChorusError, Result};

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserPayload> for Identity {
    fn from(user: UserPayload) -> Self {
        Identity::new(user.id, user.email)
    }
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: UserPayload,
}

/// Result of a sign-up request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(Identity),
    /// Account created; the service wants the email confirmed first
    ConfirmationRequired,
}

/// Hosted identity and history store: GoTrue auth plus a PostgREST table.
pub struct SupabaseStore {
    client: Client,
    url: String,
    anon_key: String,
    table: String,
    tokens: RwLock<Option<StoredTokens>>,
    auth: AuthSession,
    state_file: Option<PathBuf>,
}

impl SupabaseStore {
    pub fn new(url: &str, anon_key: &str, table: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ChorusError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            table: table.to_string(),
            tokens: RwLock::new(None),
            auth: AuthSession::default(),
            state_file: None,
        })
    }

    /// Keep tokens in the session state file so sign-in survives restarts
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        match SessionState::load_from(&path) {
            Ok(state) => *self.tokens.write() = state.tokens,
            Err(e) => warn!("could not read stored session: {}", e),
        }
        self.state_file = Some(path);
        self
    }

    pub fn has_tokens(&self) -> bool {
        self.tokens.read().is_some()
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token", self.url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ChorusError::Auth(format!("sign-in request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ChorusError::Auth(error_message(response).await));
        }

        let payload: TokenPayload = response
            .json()
            .await
            .map_err(|e| ChorusError::Auth(format!("unexpected sign-in response: {e}")))?;
        Ok(self.accept_session(payload))
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome> {
        let response = self
            .client
            .post(format!("{}/auth/v1/signup", self.url))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ChorusError::Auth(format!("sign-up request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ChorusError::Auth(error_message(response).await));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChorusError::Auth(format!("unexpected sign-up response: {e}")))?;

        // With email confirmation on, the service returns a bare user object
        match serde_json::from_value::<TokenPayload>(body) {
            Ok(payload) => Ok(SignUpOutcome::SignedIn(self.accept_session(payload))),
            Err(_) => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    /// Revoke the session remotely (best effort) and forget it locally
    pub async fn sign_out(&self) -> Result<()> {
        let access = self.tokens.read().as_ref().map(|t| t.access_token.clone());
        if let Some(access) = access {
            let result = self
                .client
                .post(format!("{}/auth/v1/logout", self.url))
                .header("apikey", &self.anon_key)
                .bearer_auth(access)
                .send()
                .await;
            match result {
                Ok(r) if !r.status().is_success() => {
                    warn!("remote sign-out returned {}", r.status())
                }
                Err(e) => warn!("remote sign-out failed: {}", e),
                Ok(_) => {}
            }
        }

        self.store_tokens(None);
        self.auth.set(None);
        info!("signed out");
        Ok(())
    }

    fn accept_session(&self, payload: TokenPayload) -> Identity {
        self.store_tokens(Some(StoredTokens {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
        }));
        let identity: Identity = payload.user.into();
        self.auth.set(Some(identity.clone()));
        info!(user = %identity.label(), "signed in");
        identity
    }

    fn store_tokens(&self, tokens: Option<StoredTokens>) {
        *self.tokens.write() = tokens.clone();

        let Some(path) = &self.state_file else {
            return;
        };
        let saved = SessionState::load_from(path).and_then(|mut state| {
            state.tokens = tokens;
            state.save_to(path)
        });
        if let Err(e) = saved {
            warn!("could not persist session tokens: {}", e);
        }
    }

    /// Exchange the refresh token for a new session. Clears the session
    /// when the service rejects it.
    async fn refresh(&self) -> bool {
        let refresh_token = self.tokens.read().as_ref().and_then(|t| t.refresh_token.clone());
        let Some(refresh_token) = refresh_token else {
            return false;
        };

        let result = self
            .client
            .post(format!("{}/auth/v1/token", self.url))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<TokenPayload>().await {
                    Ok(payload) => {
                        debug!("session refreshed");
                        self.accept_session(payload);
                        true
                    }
                    Err(e) => {
                        warn!("unexpected refresh response: {}", e);
                        false
                    }
                }
            }
            Ok(response) => {
                warn!("session refresh rejected: {}", response.status());
                self.store_tokens(None);
                self.auth.set(None);
                false
            }
            Err(e) => {
                warn!("session refresh failed: {}", e);
                false
            }
        }
    }

    fn bearer(&self) -> String {
        self.tokens
            .read()
            .as_ref()
            .map(|t| t.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    /// Send a request carrying the current session, retrying once after a
    /// refresh when the access token has expired.
    async fn send_authed<F>(&self, build: F) -> std::result::Result<Response, reqwest::Error>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let response = build(&self.bearer()).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED && self.refresh().await {
            return build(&self.bearer()).send().await;
        }
        Ok(response)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }
}

#[async_trait]
impl SessionStore for SupabaseStore {
    async fn current_user(&self) -> Option<Identity> {
        if !self.has_tokens() {
            return None;
        }

        let url = format!("{}/auth/v1/user", self.url);
        let response = self
            .send_authed(|token| {
                self.client
                    .get(&url)
                    .header("apikey", &self.anon_key)
                    .bearer_auth(token)
            })
            .await;

        match response {
            Ok(r) if r.status().is_success() => match r.json::<UserPayload>().await {
                Ok(user) => {
                    let identity: Identity = user.into();
                    self.auth.set(Some(identity.clone()));
                    Some(identity)
                }
                Err(e) => {
                    warn!("unexpected user response: {}", e);
                    None
                }
            },
            Ok(r) => {
                debug!("identity unavailable: {}", r.status());
                if r.status() == StatusCode::UNAUTHORIZED {
                    self.store_tokens(None);
                    self.auth.set(None);
                }
                None
            }
            Err(e) => {
                warn!("identity lookup failed: {}", e);
                None
            }
        }
    }

    async fn insert_history_record(&self, record: &NewHistoryRecord) -> Result<()> {
        let url = self.table_url();
        let response = self
            .send_authed(|token| {
                self.client
                    .post(&url)
                    .header("apikey", &self.anon_key)
                    .header("Prefer", "return=minimal")
                    .bearer_auth(token)
                    .json(record)
            })
            .await
            .map_err(|e| ChorusError::Persistence(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChorusError::Persistence(error_message(response).await));
        }
        Ok(())
    }

    async fn list_history_records(&self, owner_id: &str) -> Result<Vec<HistoryRecord>> {
        let url = self.table_url();
        let owner_filter = format!("eq.{}", owner_id);
        let response = self
            .send_authed(|token| {
                self.client
                    .get(&url)
                    .query(&[
                        ("select", "*"),
                        ("user_id", owner_filter.as_str()),
                        ("order", "created_at.desc"),
                    ])
                    .header("apikey", &self.anon_key)
                    .bearer_auth(token)
            })
            .await
            .map_err(|e| ChorusError::Persistence(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChorusError::Persistence(error_message(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| ChorusError::Persistence(format!("unexpected history rows: {e}")))
    }

    async fn delete_history_record(&self, id: &str) -> Result<()> {
        let url = self.table_url();
        let id_filter = format!("eq.{}", id);
        let response = self
            .send_authed(|token| {
                self.client
                    .delete(&url)
                    .query(&[("id", id_filter.as_str())])
                    .header("apikey", &self.anon_key)
                    .bearer_auth(token)
            })
            .await
            .map_err(|e| ChorusError::Persistence(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChorusError::Persistence(error_message(response).await));
        }
        Ok(())
    }

    fn auth(&self) -> AuthSession {
        self.auth.clone()
    }
}

/// Pull a readable message out of a GoTrue/PostgREST error body
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let detail = ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string);

    match detail {
        Some(detail) => format!("{} ({})", detail, status.as_u16()),
        None => format!("request failed with status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StoredResponse;
    use crate::test_support::{spawn_server, Captured};
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::collections::{BTreeMap, HashMap};
    use tempfile::TempDir;

    fn session_body(access: &str) -> Value {
        json!({
            "access_token": access,
            "refresh_token": format!("{}-refresh", access),
            "user": {"id": "user-1", "email": "alice@example.com"}
        })
    }

    /// Auth routes: password grant accepts "secret", refresh always issues
    /// "fresh", and /user only accepts "fresh".
    fn auth_router(captured: Captured) -> Router {
        let token_log = captured.clone();
        Router::new()
            .route(
                "/auth/v1/token",
                post(
                    move |Query(query): Query<HashMap<String, String>>,
                          headers: HeaderMap,
                          Json(body): Json<Value>| {
                        let log = token_log.clone();
                        async move {
                            log.record(&headers, body.clone());
                            match query.get("grant_type").map(String::as_str) {
                                Some("password") if body["password"] == "secret" => {
                                    Json(session_body("stale")).into_response()
                                }
                                Some("refresh_token") => Json(session_body("fresh")).into_response(),
                                _ => (
                                    AxumStatus::BAD_REQUEST,
                                    Json(json!({"error_description": "Invalid login credentials"})),
                                )
                                    .into_response(),
                            }
                        }
                    },
                ),
            )
            .route(
                "/auth/v1/user",
                get(|headers: HeaderMap| async move {
                    let bearer = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if bearer == "Bearer fresh" {
                        Json(json!({"id": "user-1", "email": "alice@example.com"})).into_response()
                    } else {
                        (AxumStatus::UNAUTHORIZED, Json(json!({"msg": "JWT expired"})))
                            .into_response()
                    }
                }),
            )
            .route("/auth/v1/logout", post(|| async { AxumStatus::NO_CONTENT }))
    }

    #[tokio::test]
    async fn test_sign_in_publishes_identity() {
        let base = spawn_server(auth_router(Captured::default())).await;
        let store = SupabaseStore::new(&base, "anon", "chat_history").unwrap();
        let mut watcher = store.auth().watch();

        let identity = store.sign_in_with_password("alice@example.com", "secret").await.unwrap();
        assert_eq!(identity, Identity::new("user-1", Some("alice@example.com".to_string())));
        assert!(store.has_tokens());
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), Some(identity));
    }

    #[tokio::test]
    async fn test_bad_password_is_auth_error() {
        let base = spawn_server(auth_router(Captured::default())).await;
        let store = SupabaseStore::new(&base, "anon", "chat_history").unwrap();

        let err = store.sign_in_with_password("alice@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ChorusError::Auth(_)));
        assert!(err.to_string().contains("Invalid login credentials"));
        assert!(store.auth().current().is_none());
    }

    #[tokio::test]
    async fn test_current_user_refreshes_expired_token() {
        let captured = Captured::default();
        let base = spawn_server(auth_router(captured.clone())).await;
        let store = SupabaseStore::new(&base, "anon", "chat_history").unwrap();

        // Sign-in hands out "stale", which /user rejects until refreshed
        store.sign_in_with_password("alice@example.com", "secret").await.unwrap();
        let user = store.current_user().await.unwrap();
        assert_eq!(user.id, "user-1");

        let (_, refresh_body) = captured.last().unwrap();
        assert_eq!(refresh_body["refresh_token"], "stale-refresh");
    }

    #[tokio::test]
    async fn test_no_session_means_no_identity() {
        let store = SupabaseStore::new("http://127.0.0.1:9", "anon", "chat_history").unwrap();
        assert!(store.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_persisted_tokens() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("session.toml");
        let base = spawn_server(auth_router(Captured::default())).await;

        let store = SupabaseStore::new(&base, "anon", "chat_history")
            .unwrap()
            .with_state_file(state_path.clone());
        store.sign_in_with_password("alice@example.com", "secret").await.unwrap();
        assert!(SessionState::load_from(&state_path).unwrap().tokens.is_some());

        // A second process picks the session up from disk
        let restored = SupabaseStore::new(&base, "anon", "chat_history")
            .unwrap()
            .with_state_file(state_path.clone());
        assert!(restored.has_tokens());

        store.sign_out().await.unwrap();
        assert!(!store.has_tokens());
        assert!(store.auth().current().is_none());
        assert!(SessionState::load_from(&state_path).unwrap().tokens.is_none());
    }

    #[tokio::test]
    async fn test_history_table_requests() {
        let inserts = Captured::default();
        let queries: std::sync::Arc<parking_lot::Mutex<Vec<HashMap<String, String>>>> =
            Default::default();

        let insert_log = inserts.clone();
        let list_log = queries.clone();
        let delete_log = queries.clone();
        let router = Router::new().route(
            "/rest/v1/chat_history",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let log = insert_log.clone();
                async move {
                    log.record(&headers, body);
                    AxumStatus::CREATED
                }
            })
            .get(move |Query(query): Query<HashMap<String, String>>| {
                let log = list_log.clone();
                async move {
                    log.lock().push(query);
                    Json(json!([{
                        "id": 7,
                        "user_id": "user-1",
                        "prompt": "Explain recursion",
                        "models": ["GPT", "Claude"],
                        "responses": {"GPT": {"text": "Recursion is...", "error": null}},
                        "created_at": "2024-05-01T10:00:00+00:00"
                    }]))
                }
            })
            .delete(move |Query(query): Query<HashMap<String, String>>| {
                let log = delete_log.clone();
                async move {
                    log.lock().push(query);
                    AxumStatus::NO_CONTENT
                }
            }),
        );
        let base = spawn_server(router).await;
        let store = SupabaseStore::new(&base, "anon", "chat_history").unwrap();

        let mut responses = BTreeMap::new();
        responses.insert(
            "GPT".to_string(),
            StoredResponse {
                text: "Recursion is...".to_string(),
                error: None,
            },
        );
        store
            .insert_history_record(&NewHistoryRecord {
                owner_id: "user-1".to_string(),
                prompt_text: "Explain recursion".to_string(),
                model_names: vec!["GPT".to_string(), "Claude".to_string()],
                responses,
            })
            .await
            .unwrap();

        let (headers, body) = inserts.last().unwrap();
        assert_eq!(headers.get("prefer").unwrap(), "return=minimal");
        assert_eq!(headers.get("apikey").unwrap(), "anon");
        assert_eq!(body["user_id"], "user-1");
        assert_eq!(body["models"], json!(["GPT", "Claude"]));

        let records = store.list_history_records("user-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "7");

        store.delete_history_record("7").await.unwrap();

        let seen = queries.lock().clone();
        assert_eq!(seen[0]["user_id"], "eq.user-1");
        assert_eq!(seen[0]["order"], "created_at.desc");
        assert_eq!(seen[1]["id"], "eq.7");
    }

    #[tokio::test]
    async fn test_insert_failure_is_persistence_error() {
        let router = Router::new().route(
            "/rest/v1/chat_history",
            post(|| async {
                (
                    AxumStatus::FORBIDDEN,
                    Json(json!({"message": "new row violates row-level security policy"})),
                )
            }),
        );
        let base = spawn_server(router).await;
        let store = SupabaseStore::new(&base, "anon", "chat_history").unwrap();

        let err = store
            .insert_history_record(&NewHistoryRecord {
                owner_id: "user-1".to_string(),
                prompt_text: "hi".to_string(),
                model_names: vec![],
                responses: BTreeMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChorusError::Persistence(_)));
        assert!(err.to_string().contains("row-level security"));
    }
}
