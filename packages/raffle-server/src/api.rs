//! Account and friend REST API handlers.
//!
//! Every route except register, login and password reset expects an
//! `Authorization: Bearer <token>` header carrying a token issued by
//! register or login. A login token starts without a loaded profile; call
//! `GET /api/me` before friend operations that need it.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use raffle_core::{AccountId, AuthErrorKind, Error, InconsistencyMarker, Person};
use serde::{Deserialize, Serialize};

use crate::state::{ClientSession, ServerState};

// ── Request / Response Types ─────────────────────────────────────────────────

/// POST /api/accounts
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// POST /api/sessions
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/accounts/password-reset
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// POST /api/friends, /api/friends/link-self, /api/friends/mutual
#[derive(Debug, Deserialize)]
pub struct FriendRequest {
    pub target: AccountId,
}

/// GET /api/users/search
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub username: String,
}

/// GET /api/friends/reverse
#[derive(Debug, Deserialize)]
pub struct ReverseQuery {
    /// Defaults to the caller's own account
    pub target: Option<AccountId>,
}

/// Issued by register and login.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub token: String,
    pub account_id: AccountId,
}

/// Search results; matches that failed to decode are listed separately.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
    pub people: Vec<Person>,
    pub malformed: Vec<String>,
}

/// Generic response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Core error code, when the failure came from the core
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

pub type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn success<T: Serialize>(status: StatusCode, data: T) -> ApiResult<T> {
    (
        status,
        Json(ApiResponse {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        }),
    )
}

fn error_response<T: Serialize>(status: StatusCode, msg: &str) -> ApiResult<T> {
    (
        status,
        Json(ApiResponse {
            ok: false,
            data: None,
            error: Some(msg.to_string()),
            code: None,
        }),
    )
}

fn core_error<T: Serialize>(err: &Error) -> ApiResult<T> {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(code = err.code(), error = %err, "Request failed");
    }

    (
        status,
        Json(ApiResponse {
            ok: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.code()),
        }),
    )
}

/// HTTP status for a core error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NoSession => StatusCode::UNAUTHORIZED,
        Error::SessionMismatch { .. } => StatusCode::FORBIDDEN,
        Error::Auth { kind, .. } => match kind {
            AuthErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthErrorKind::AccountExists => StatusCode::CONFLICT,
            AuthErrorKind::WeakPassword | AuthErrorKind::InvalidEmail => StatusCode::BAD_REQUEST,
            AuthErrorKind::UnknownAccount => StatusCode::NOT_FOUND,
            AuthErrorKind::Rejected => StatusCode::FORBIDDEN,
        },
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::MalformedRecord(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::AlreadyLinked { .. } => StatusCode::CONFLICT,
        Error::CannotLinkSelf => StatusCode::BAD_REQUEST,
        Error::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::PartialDeletion { .. } | Error::Serialization(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Resolve the bearer token to its session.
fn authorize<T: Serialize>(
    state: &ServerState,
    headers: &HeaderMap,
) -> Result<(String, ClientSession), ApiResult<T>> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Missing bearer token"))?;

    let session = state
        .session(token)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Unknown or expired session"))?;

    Ok((token.to_string(), session))
}

macro_rules! authorized {
    ($state:expr, $headers:expr) => {
        match authorize(&$state, &$headers) {
            Ok(v) => v,
            Err(rejection) => return rejection,
        }
    };
}

// ── Router ───────────────────────────────────────────────────────────────────

/// All account and friend routes.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/accounts", post(register))
        .route("/api/accounts/password-reset", post(request_password_reset))
        .route("/api/sessions", post(login).delete(logout))
        .route(
            "/api/me",
            get(load_current).put(save_current).delete(delete_account),
        )
        .route("/api/friends", post(add_friend_link))
        .route("/api/friends/link-self", post(link_self_into))
        .route("/api/friends/mutual", post(link_mutual))
        .route("/api/friends/reverse", get(fetch_reverse_friends))
        .route("/api/friends/cached", get(cached_friends))
        .route("/api/users/search", get(search_by_username))
        .route("/api/repairs", get(pending_repairs))
        .route("/api/repairs/:id", post(repair))
        .with_state(state)
}

// ── Account Handlers ─────────────────────────────────────────────────────────

/// POST /api/accounts: Create an account and sign it in.
pub async fn register(
    State(state): State<ServerState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<SessionInfo> {
    if req.username.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "username is required");
    }

    let client = state.new_client();
    match client
        .directory()
        .register(&req.name, &req.username, &req.email, &req.password)
        .await
    {
        Ok(account_id) => {
            let token = state.open_session(client, account_id.clone());
            success(StatusCode::CREATED, SessionInfo { token, account_id })
        }
        Err(e) => core_error(&e),
    }
}

/// POST /api/sessions: Sign in. The profile is not loaded yet.
pub async fn login(
    State(state): State<ServerState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<SessionInfo> {
    let client = state.new_client();
    match client.directory().login(&req.email, &req.password).await {
        Ok(account_id) => {
            let token = state.open_session(client, account_id.clone());
            success(StatusCode::OK, SessionInfo { token, account_id })
        }
        Err(e) => core_error(&e),
    }
}

/// DELETE /api/sessions: Sign out and drop the token.
pub async fn logout(State(state): State<ServerState>, headers: HeaderMap) -> ApiResult<()> {
    let (token, session) = authorized!(state, headers);

    let result = session.client.directory().logout().await;
    state.close_session(&token);

    match result {
        Ok(()) => success(StatusCode::OK, ()),
        Err(e) => core_error(&e),
    }
}

/// POST /api/accounts/password-reset
pub async fn request_password_reset(
    State(state): State<ServerState>,
    Json(req): Json<ResetRequest>,
) -> ApiResult<()> {
    match state
        .new_client()
        .directory()
        .request_password_reset(&req.email)
        .await
    {
        Ok(()) => success(StatusCode::ACCEPTED, ()),
        Err(e) => core_error(&e),
    }
}

/// GET /api/me: Load the caller's profile into the session.
pub async fn load_current(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ApiResult<Person> {
    let (_, session) = authorized!(state, headers);

    match session.client.directory().load_current(&session.account).await {
        Ok(person) => success(StatusCode::OK, person),
        Err(e) => core_error(&e),
    }
}

/// PUT /api/me: Overwrite the caller's profile.
pub async fn save_current(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(person): Json<Person>,
) -> ApiResult<Person> {
    let (_, session) = authorized!(state, headers);

    match session.client.directory().save_current(person.clone()).await {
        Ok(()) => success(StatusCode::OK, person),
        Err(e) => core_error(&e),
    }
}

/// DELETE /api/me: Delete the caller's account.
pub async fn delete_account(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ApiResult<()> {
    let (token, session) = authorized!(state, headers);

    let result = session
        .client
        .directory()
        .delete_account(&session.account)
        .await;

    if !session.client.session().is_active().await {
        state.close_session(&token);
    }

    match result {
        Ok(()) => success(StatusCode::OK, ()),
        Err(e) => core_error(&e),
    }
}

// ── Friend Handlers ──────────────────────────────────────────────────────────

/// POST /api/friends: Add an outgoing link from the caller.
pub async fn add_friend_link(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<FriendRequest>,
) -> ApiResult<()> {
    let (_, session) = authorized!(state, headers);

    match session
        .client
        .social()
        .add_friend_link(&session.account, &req.target)
        .await
    {
        Ok(()) => success(StatusCode::CREATED, ()),
        Err(e) => core_error(&e),
    }
}

/// POST /api/friends/link-self: Add the caller to the target's friends.
pub async fn link_self_into(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<FriendRequest>,
) -> ApiResult<()> {
    let (_, session) = authorized!(state, headers);

    match session
        .client
        .social()
        .link_self_into(&req.target, &session.account)
        .await
    {
        Ok(()) => success(StatusCode::OK, ()),
        Err(e) => core_error(&e),
    }
}

/// POST /api/friends/mutual: Link the caller and the target both ways.
pub async fn link_mutual(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<FriendRequest>,
) -> ApiResult<()> {
    let (_, session) = authorized!(state, headers);

    match session.client.social().link_mutual(&req.target).await {
        Ok(()) => success(StatusCode::OK, ()),
        Err(e) => core_error(&e),
    }
}

/// GET /api/friends/reverse: Accounts that list the target as a friend.
pub async fn fetch_reverse_friends(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<ReverseQuery>,
) -> ApiResult<Vec<Person>> {
    let (_, session) = authorized!(state, headers);
    let target = query.target.unwrap_or_else(|| session.account.clone());

    match session.client.social().fetch_reverse_friends(&target).await {
        Ok(people) => success(StatusCode::OK, people),
        Err(e) => core_error(&e),
    }
}

/// GET /api/friends/cached: Result of the last reverse-friend fetch.
pub async fn cached_friends(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Person>> {
    let (_, session) = authorized!(state, headers);
    success(StatusCode::OK, session.client.social().cached_friends().await)
}

/// GET /api/users/search?username=: Exact username match.
pub async fn search_by_username(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> ApiResult<SearchResults> {
    let (_, session) = authorized!(state, headers);

    let mut results = SearchResults {
        people: Vec::new(),
        malformed: Vec::new(),
    };

    let mut stream = Box::pin(session.client.social().search_by_username(query.username));
    while let Some(item) = stream.next().await {
        match item {
            Ok(person) => results.people.push(person),
            Err(Error::MalformedRecord(detail)) => results.malformed.push(detail),
            Err(e) => return core_error(&e),
        }
    }

    success(StatusCode::OK, results)
}

// ── Repair Handlers ──────────────────────────────────────────────────────────

/// GET /api/repairs: Outstanding inconsistency markers for the caller.
pub async fn pending_repairs(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ApiResult<Vec<InconsistencyMarker>> {
    let (_, session) = authorized!(state, headers);

    match session
        .client
        .directory()
        .pending_repairs_for(&session.account)
        .await
    {
        Ok(markers) => success(StatusCode::OK, markers),
        Err(e) => core_error(&e),
    }
}

/// POST /api/repairs/:id: Finish the step one of the caller's markers describes.
pub async fn repair(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let (_, session) = authorized!(state, headers);
    let directory = session.client.directory();

    // Markers of other accounts are reported as missing
    let marker = match directory.pending_repairs_for(&session.account).await {
        Ok(markers) => markers.into_iter().find(|m| m.id == id),
        Err(e) => return core_error(&e),
    };

    let Some(marker) = marker else {
        return error_response(StatusCode::NOT_FOUND, "Repair marker not found");
    };

    match directory.repair(&marker).await {
        Ok(()) => success(StatusCode::OK, ()),
        Err(e) => core_error(&e),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
