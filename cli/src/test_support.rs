//! Fakes shared by the unit tests: an in-process HTTP backend and an in-memory
//! `QuestBackend`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::task::JoinHandle;
use verilingua_core::progress::{QuestLevel, UserSummary};
use verilingua_core::quests::{Quest, SubmissionVerdict, VerdictResult};

use crate::api::QuestBackend;
use crate::client::{ClientError, LoginRedirect};
use crate::session::CompletionListener;

const VALID_TOKEN: &str = "good-token";

#[derive(Debug, Default)]
pub struct CountingRedirect {
    calls: AtomicUsize,
}

impl CountingRedirect {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LoginRedirect for CountingRedirect {
    fn redirect_to_login(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct CountingListener {
    calls: AtomicUsize,
}

impl CountingListener {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CompletionListener for CountingListener {
    fn credential_granted(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn quest(id: i64, title: &str) -> Quest {
    Quest {
        id,
        title: title.to_string(),
        content: format!("Content of {title}"),
    }
}

pub fn verdict(result: VerdictResult, feedback: &str) -> SubmissionVerdict {
    SubmissionVerdict {
        result,
        feedback: feedback.to_string(),
        completed: None,
    }
}

// ---------------------------------------------------------------------------
// HTTP fake
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    Issue(String),
    Reject,
}

#[derive(Debug, Clone)]
pub struct RecordedRefresh {
    pub body: serde_json::Value,
    pub authorization: Option<String>,
}

#[derive(Debug)]
pub struct FakeServerState {
    pub me_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub talk_calls: AtomicUsize,
    refresh: Mutex<RefreshBehavior>,
    current_quest: Mutex<Option<Quest>>,
    authorizations: Mutex<Vec<String>>,
    refresh_requests: Mutex<Vec<RecordedRefresh>>,
    submissions: Mutex<Vec<(i64, serde_json::Value)>>,
    started: Mutex<Vec<u8>>,
}

impl Default for FakeServerState {
    fn default() -> Self {
        Self {
            me_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            talk_calls: AtomicUsize::new(0),
            refresh: Mutex::new(RefreshBehavior::Issue(VALID_TOKEN.to_string())),
            current_quest: Mutex::new(Some(quest(7, "Past tense"))),
            authorizations: Mutex::new(Vec::new()),
            refresh_requests: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
        }
    }
}

impl FakeServerState {
    pub fn set_refresh(&self, behavior: RefreshBehavior) {
        *self.refresh.lock().unwrap() = behavior;
    }

    pub fn set_current_quest(&self, quest: Option<Quest>) {
        *self.current_quest.lock().unwrap() = quest;
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.authorizations.lock().unwrap().last().cloned()
    }

    pub fn last_refresh_request(&self) -> Option<RecordedRefresh> {
        self.refresh_requests.lock().unwrap().last().cloned()
    }

    pub fn last_submission(&self) -> Option<(i64, serde_json::Value)> {
        self.submissions.lock().unwrap().last().cloned()
    }

    pub fn started_levels(&self) -> Vec<u8> {
        self.started.lock().unwrap().clone()
    }

    /// Records the header and reports whether it carries the valid token.
    fn authorize(&self, headers: &HeaderMap) -> bool {
        let value = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let ok = value == format!("Bearer {VALID_TOKEN}");
        self.authorizations.lock().unwrap().push(value);
        ok
    }
}

type Shared = Arc<FakeServerState>;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Unauthorized", "message": "token expired"})),
    )
        .into_response()
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.me_calls.fetch_add(1, Ordering::SeqCst);
    if !state.authorize(&headers) {
        return unauthorized();
    }
    Json(json!({
        "name": "Mina",
        "walletAddress": "0xabc",
        "l1TokenCount": 2,
        "etherscanUrl": "https://sepolia.etherscan.io/address/0xabc"
    }))
    .into_response()
}

async fn current_quest(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !state.authorize(&headers) {
        return unauthorized();
    }
    match state.current_quest.lock().unwrap().clone() {
        Some(quest) => Json(quest).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

async fn start(
    State(state): State<Shared>,
    Path(level): Path<u8>,
    headers: HeaderMap,
) -> Response {
    if !state.authorize(&headers) {
        return unauthorized();
    }
    state.started.lock().unwrap().push(level);
    StatusCode::OK.into_response()
}

async fn submit(
    State(state): State<Shared>,
    Path(quest_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.authorize(&headers) {
        return unauthorized();
    }
    if quest_id != 7 {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Not Found", "message": "quest not found"})),
        )
            .into_response();
    }
    let parsed = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state.submissions.lock().unwrap().push((quest_id, parsed));
    Json(json!({"result": "PASS", "feedback": "Correct!"})).into_response()
}

async fn talk(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    if !state.authorize(&headers) {
        return unauthorized();
    }
    state.talk_calls.fetch_add(1, Ordering::SeqCst);
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
    let message = parsed["message"].as_str().unwrap_or_default();
    Json(json!({"reply": format!("echo: {message}")})).into_response()
}

async fn refresh(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    state.refresh_requests.lock().unwrap().push(RecordedRefresh {
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });
    match state.refresh.lock().unwrap().clone() {
        RefreshBehavior::Issue(token) => Json(json!({"accessToken": token})).into_response(),
        RefreshBehavior::Reject => (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Forbidden", "message": "refresh denied"})),
        )
            .into_response(),
    }
}

/// Backend stand-in listening on an ephemeral local port under `/api`.
pub struct FakeServer {
    pub state: Shared,
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(FakeServerState::default());
        let api = Router::new()
            .route("/users/me", get(me))
            .route("/quests/current", get(current_quest))
            .route("/quests/start/{level}", post(start))
            .route("/quests/{id}/submit", post(submit))
            .route("/chat/talk", post(talk))
            .route("/auth/refresh", post(refresh))
            .with_state(state.clone());
        let app = Router::new().nest("/api", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            addr,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop listening; later connections to `base_url` are refused.
    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Scripted `QuestBackend`. Each queue is consumed front to back; an exhausted queue
/// yields the fallback (no quest, PASS without marker, an echo reply).
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub summary: Mutex<UserSummary>,
    pub quests: Mutex<VecDeque<Result<Option<Quest>, String>>>,
    pub verdicts: Mutex<VecDeque<Result<SubmissionVerdict, String>>>,
    pub start_failures: Mutex<VecDeque<String>>,
    pub started: Mutex<Vec<u8>>,
    pub submissions: Mutex<Vec<(i64, String)>>,
    pub talks: Mutex<Vec<String>>,
    pub quest_fetches: AtomicUsize,
    pub user_fetches: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: u32) -> Self {
        let backend = Self::default();
        backend.summary.lock().unwrap().l1_token_count = tokens;
        backend
    }

    pub fn push_quest(&self, quest: Option<Quest>) {
        self.quests.lock().unwrap().push_back(Ok(quest));
    }

    pub fn push_quest_error(&self, message: &str) {
        self.quests.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn push_verdict(&self, verdict: SubmissionVerdict) {
        self.verdicts.lock().unwrap().push_back(Ok(verdict));
    }

    pub fn push_verdict_error(&self, message: &str) {
        self.verdicts
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn started_levels(&self) -> Vec<u8> {
        self.started.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

fn fake_error(message: String) -> ClientError {
    ClientError::Status {
        status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        message,
    }
}

#[async_trait]
impl QuestBackend for FakeBackend {
    async fn current_user(&self) -> Result<UserSummary, ClientError> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.summary.lock().unwrap().clone())
    }

    async fn current_quest(&self) -> Result<Option<Quest>, ClientError> {
        self.quest_fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.quests.lock().unwrap().pop_front();
        match next {
            Some(result) => result.map_err(fake_error),
            None => Ok(None),
        }
    }

    async fn start_level(&self, level: QuestLevel) -> Result<(), ClientError> {
        if let Some(message) = self.start_failures.lock().unwrap().pop_front() {
            return Err(fake_error(message));
        }
        self.started.lock().unwrap().push(level.get());
        Ok(())
    }

    async fn submit_answer(
        &self,
        quest_id: i64,
        answer: &str,
    ) -> Result<SubmissionVerdict, ClientError> {
        self.submissions
            .lock()
            .unwrap()
            .push((quest_id, answer.to_string()));
        let next = self.verdicts.lock().unwrap().pop_front();
        match next {
            Some(result) => result.map_err(fake_error),
            None => Ok(verdict(VerdictResult::Pass, "Correct!")),
        }
    }

    async fn talk(&self, message: &str) -> Result<String, ClientError> {
        self.talks.lock().unwrap().push(message.to_string());
        Ok(format!("echo: {message}"))
    }
}
