//! Shared test support: an in-memory fake of the REST backend.
//!
//! `FakeBackend` implements `HttpTransport` directly, so the lifecycle and
//! pipeline run against it exactly as they would against the network. It
//! issues tokens `A1`/`R1`, `A2`/`R2`, ... from one counter, records every
//! request it sees, and has knobs for expiring tokens, going offline,
//! holding 401 responses until several requests have arrived, and pausing
//! one endpoint until the test lets it answer.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use taleweave_protocol::{
    Credentials, JsonCodec, RefreshRequest, Registration, TokenPair, UserSummary,
    endpoints,
};
use taleweave_session::{
    CredentialStore, MemoryStorage, RequestPipeline, SessionConfig,
    SessionLifecycle,
};
use taleweave_transport::{
    ApiRequest, ApiResponse, HttpTransport, Method, TransportError,
};
use tokio::sync::{Barrier, Notify};

pub const STORAGE_KEY: &str = "taleweave.session";

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct BackendState {
    users: HashMap<String, (String, UserSummary)>,
    /// token -> username
    access: HashMap<String, String>,
    refresh: HashMap<String, String>,
    next_token: u64,
    register_auto_login: bool,
    status_overrides: HashMap<String, (u16, serde_json::Value)>,
}

/// A paused endpoint: `arrived` fires when a request reaches it, and the
/// response is held until `release` is notified.
#[derive(Clone, Default)]
pub struct Hold {
    pub arrived: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    log: Mutex<Vec<Recorded>>,
    offline: AtomicBool,
    unauthorized_gate: Mutex<Option<Arc<Barrier>>>,
    holds: Mutex<HashMap<String, Hold>>,
}

impl FakeBackend {
    /// A backend that knows `alice` / `secret` and auto-logs-in on register.
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.state.lock().unwrap().register_auto_login = true;
        backend.add_user("alice", "secret", "alice@example.com");
        Arc::new(backend)
    }

    pub fn add_user(&self, username: &str, password: &str, email: &str) -> UserSummary {
        let mut state = self.state.lock().unwrap();
        let user = UserSummary::new(
            state.users.len() as u64 + 1,
            username,
            email,
        );
        state
            .users
            .insert(username.to_string(), (password.to_string(), user.clone()));
        user
    }

    /// Issues a valid token pair for an existing user, as if they had
    /// logged in during an earlier run.
    pub fn issue_tokens(&self, username: &str) -> TokenPair {
        let mut state = self.state.lock().unwrap();
        issue(&mut state, username)
    }

    pub fn expire_access(&self, token: &str) {
        self.state.lock().unwrap().access.remove(token);
    }

    pub fn revoke_refresh(&self, token: &str) {
        self.state.lock().unwrap().refresh.remove(token);
    }

    pub fn set_register_auto_login(&self, on: bool) {
        self.state.lock().unwrap().register_auto_login = on;
    }

    /// Forces every request to `path` to answer with `status`.
    pub fn override_status(&self, path: &str, status: u16) {
        self.override_response(path, status, json!({"detail": "overridden"}));
    }

    /// Forces every request to `path` to answer with `status` and `body`.
    pub fn override_response(&self, path: &str, status: u16, body: serde_json::Value) {
        self.state
            .lock()
            .unwrap()
            .status_overrides
            .insert(path.to_string(), (status, body));
    }

    pub fn clear_override(&self, path: &str) {
        self.state.lock().unwrap().status_overrides.remove(path);
    }

    /// Pauses responses from `path` until the returned hold is released.
    pub fn hold(&self, path: &str) -> Hold {
        let hold = Hold::default();
        self.holds
            .lock()
            .unwrap()
            .insert(path.to_string(), hold.clone());
        hold
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Holds every 401 on a domain endpoint until `n` of them are waiting.
    pub fn gate_unauthorized(&self, n: usize) {
        *self.unauthorized_gate.lock().unwrap() = Some(Arc::new(Barrier::new(n)));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn refresh_calls(&self) -> usize {
        self.count(endpoints::TOKEN_REFRESH)
    }

    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let mut state = self.state.lock().unwrap();
        if let Some((status, body)) = state.status_overrides.get(&request.path) {
            return respond(*status, body.clone());
        }

        let body = request.body.as_deref().unwrap_or_default();
        let owner = request
            .bearer
            .as_ref()
            .and_then(|token| state.access.get(token).cloned());

        match (request.method, request.path.as_str()) {
            (Method::Post, endpoints::TOKEN) => {
                let creds: Credentials = match serde_json::from_slice(body) {
                    Ok(c) => c,
                    Err(_) => return respond(400, json!({"password": ["This field is required."]})),
                };
                let known = state
                    .users
                    .get(&creds.username)
                    .is_some_and(|(password, _)| *password == creds.password);
                if !known {
                    return respond(
                        401,
                        json!({"detail": "No active account found with the given credentials"}),
                    );
                }
                let pair = issue(&mut state, &creds.username);
                respond(200, json!({"access": pair.access, "refresh": pair.refresh}))
            }
            (Method::Post, endpoints::REGISTER) => {
                let reg: Registration = match serde_json::from_slice(body) {
                    Ok(r) => r,
                    Err(_) => return respond(400, json!({"detail": "bad request"})),
                };
                if state.users.contains_key(&reg.username) {
                    return respond(
                        400,
                        json!({"username": ["A user with that username already exists."]}),
                    );
                }
                if !reg.email.contains('@') {
                    return respond(400, json!({"email": ["Enter a valid email address."]}));
                }
                let user = UserSummary::new(
                    state.users.len() as u64 + 1,
                    reg.username.clone(),
                    reg.email.clone(),
                );
                state
                    .users
                    .insert(reg.username.clone(), (reg.password.clone(), user.clone()));
                if state.register_auto_login {
                    let pair = issue(&mut state, &reg.username);
                    respond(
                        201,
                        json!({"user": user, "tokens": {"access": pair.access, "refresh": pair.refresh}}),
                    )
                } else {
                    respond(201, json!({"user": user}))
                }
            }
            (Method::Post, endpoints::TOKEN_REFRESH) => {
                let req: RefreshRequest = match serde_json::from_slice(body) {
                    Ok(r) => r,
                    Err(_) => return respond(400, json!({"refresh": ["This field is required."]})),
                };
                let Some(owner) = state.refresh.get(&req.refresh).cloned() else {
                    return respond(
                        401,
                        json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
                    );
                };
                state.next_token += 1;
                let access = format!("A{}", state.next_token);
                state.access.insert(access.clone(), owner);
                respond(200, json!({"access": access}))
            }
            (Method::Get, endpoints::CURRENT_USER) | (Method::Get, endpoints::PROFILE) => {
                match owner.and_then(|name| state.users.get(&name).map(|(_, u)| u.clone())) {
                    Some(user) => respond(200, json!(user)),
                    None => unauthorized(),
                }
            }
            (_, "/forbidden/") => unauthorized(),
            (_, "/missing/") => respond(404, json!({"detail": "Not found."})),
            (method, path) => {
                let sent_invalid = request.bearer.is_some() && owner.is_none();
                let needs_auth = path.starts_with("/private/") || method != Method::Get;
                if sent_invalid || (needs_auth && owner.is_none()) {
                    return unauthorized();
                }
                let echoed: serde_json::Value =
                    serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
                respond(
                    200,
                    json!({"method": method.as_str(), "path": path, "user": owner, "body": echoed}),
                )
            }
        }
    }
}

fn issue(state: &mut BackendState, username: &str) -> TokenPair {
    state.next_token += 1;
    let pair = TokenPair::new(
        format!("A{}", state.next_token),
        format!("R{}", state.next_token),
    );
    state.access.insert(pair.access.clone(), username.to_string());
    state.refresh.insert(pair.refresh.clone(), username.to_string());
    pair
}

fn respond(status: u16, body: serde_json::Value) -> ApiResponse {
    ApiResponse::new(status, serde_json::to_vec(&body).unwrap())
}

fn unauthorized() -> ApiResponse {
    respond(
        401,
        json!({"detail": "Given token not valid for any token type", "code": "token_not_valid"}),
    )
}

impl HttpTransport for FakeBackend {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.log.lock().unwrap().push(Recorded {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            bearer: request.bearer.clone(),
            body: String::from_utf8_lossy(request.body.as_deref().unwrap_or_default())
                .into_owned(),
        });

        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed("backend offline".into()));
        }

        let response = self.handle(request);
        let is_auth_endpoint = request.path.starts_with("/auth/");
        if response.is_unauthorized() && !is_auth_endpoint {
            let gate = self.unauthorized_gate.lock().unwrap().clone();
            if let Some(barrier) = gate {
                barrier.wait().await;
            }
        }
        let hold = self.holds.lock().unwrap().get(&request.path).cloned();
        if let Some(hold) = hold {
            hold.arrived.notify_one();
            hold.release.notified().await;
        }
        if request.path == endpoints::TOKEN_REFRESH {
            // Give other tasks a chance to pile up behind the refresh.
            tokio::task::yield_now().await;
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub type Lifecycle = SessionLifecycle<FakeBackend, JsonCodec>;
pub type Pipeline = RequestPipeline<FakeBackend, JsonCodec>;

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub storage: MemoryStorage,
    pub lifecycle: Arc<Lifecycle>,
    pub pipeline: Pipeline,
}

impl Harness {
    /// A second credential store over the same storage, for asserting
    /// what was persisted.
    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(self.storage.clone(), STORAGE_KEY)
    }
}

pub fn harness() -> Harness {
    harness_with(FakeBackend::new(), MemoryStorage::new())
}

pub fn harness_with(backend: Arc<FakeBackend>, storage: MemoryStorage) -> Harness {
    let store = CredentialStore::new(storage.clone(), STORAGE_KEY);
    let lifecycle = Arc::new(SessionLifecycle::new(
        Arc::clone(&backend),
        JsonCodec,
        store,
        SessionConfig::default(),
    ));
    let pipeline = RequestPipeline::new(Arc::clone(&lifecycle));
    Harness {
        backend,
        storage,
        lifecycle,
        pipeline,
    }
}

pub fn alice() -> Credentials {
    Credentials::new("alice", "secret")
}
