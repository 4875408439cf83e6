//! HTTP routes for the session supervisor's six tool operations.

use crate::state::AppState;
use serde::{Deserialize, Serialize};
use session_core::error::SupervisorError;
use session_core::manager::{ListEntry, SayOverrides};
use session_core::session::{ApprovalPolicy, SpawnParams};
use std::convert::Infallible;
use std::path::PathBuf;
use warp::{http::StatusCode, Filter, Reply};

/// Create all API routes.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let api = warp::path("api").and(warp::path("sessions"));

    let start = api
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(start_session);

    let say = api
        .and(warp::path::param::<String>())
        .and(warp::path("say"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(say_session);

    let status = api
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<StatusQuery>())
        .and(with_state(state.clone()))
        .and_then(get_status);

    let respond = api
        .and(warp::path::param::<String>())
        .and(warp::path("respond"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(respond_to_question);

    let interrupt = api
        .and(warp::path::param::<String>())
        .and(warp::path("interrupt"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(interrupt_session);

    let list = api
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(with_state(state))
        .and_then(list_sessions);

    start.or(say).or(status).or(respond).or(interrupt).or(list)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl SupervisorError {
    /// Maps each named error kind onto an HTTP status; the internal-plumbing
    /// variants fall back to 500.
    fn status_code(&self) -> StatusCode {
        match self {
            SupervisorError::UnknownSession(_) => StatusCode::NOT_FOUND,
            SupervisorError::NoActiveProcess(_) => StatusCode::CONFLICT,
            SupervisorError::AlreadyTerminal(_) => StatusCode::CONFLICT,
            SupervisorError::NoPendingQuestion(_) => StatusCode::CONFLICT,
            SupervisorError::IdMismatch { .. } => StatusCode::CONFLICT,
            SupervisorError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SupervisorError::Busy(_) => StatusCode::CONFLICT,
            SupervisorError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SupervisorError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SupervisorError::InvalidWorkingDirectory(_) => StatusCode::BAD_REQUEST,
            SupervisorError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn error_reply(err: SupervisorError) -> Result<warp::reply::WithStatus<warp::reply::Json>, Infallible> {
    let code = err.status_code();
    tracing::warn!(%err, "tool operation failed");
    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse { error: err.to_string() }),
        code,
    ))
}

// ============================================================================
// start
// ============================================================================

async fn start_session(
    params: SpawnParams,
    state: AppState,
) -> Result<impl Reply, Infallible> {
    match state.manager.start(params).await {
        Ok(result) => Ok(ok_json(&result, StatusCode::CREATED)),
        Err(err) => error_reply(err),
    }
}

// ============================================================================
// say
// ============================================================================

#[derive(Debug, Deserialize)]
struct SayRequest {
    message: String,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    approval_policy: Option<ApprovalPolicy>,
}

async fn say_session(
    session_id: String,
    body: SayRequest,
    state: AppState,
) -> Result<impl Reply, Infallible> {
    let overrides = SayOverrides {
        images: body.images,
        approval_policy: body.approval_policy,
    };
    match state.manager.say(&session_id, body.message, overrides).await {
        Ok(result) => Ok(ok_json(&result, StatusCode::OK)),
        Err(err) => error_reply(err),
    }
}

// ============================================================================
// status
// ============================================================================

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    output_lines: Option<usize>,
}

async fn get_status(
    session_id: String,
    query: StatusQuery,
    state: AppState,
) -> Result<impl Reply, Infallible> {
    match state.manager.status(&session_id, query.output_lines).await {
        Ok(view) => Ok(ok_json(&view, StatusCode::OK)),
        Err(err) => error_reply(err),
    }
}

// ============================================================================
// respond
// ============================================================================

#[derive(Debug, Deserialize)]
struct RespondRequest {
    question_id: String,
    #[serde(default)]
    answers: Vec<String>,
}

async fn respond_to_question(
    session_id: String,
    body: RespondRequest,
    state: AppState,
) -> Result<impl Reply, Infallible> {
    match state
        .manager
        .respond(&session_id, &body.question_id, body.answers)
        .await
    {
        Ok(result) => Ok(ok_json(&result, StatusCode::OK)),
        Err(err) => error_reply(err),
    }
}

// ============================================================================
// interrupt
// ============================================================================

async fn interrupt_session(session_id: String, state: AppState) -> Result<impl Reply, Infallible> {
    match state.manager.interrupt(&session_id).await {
        Ok(result) => Ok(ok_json(&result, StatusCode::OK)),
        Err(err) => error_reply(err),
    }
}

// ============================================================================
// list
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    filter_dir: Option<PathBuf>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_sessions(query: ListQuery, state: AppState) -> Result<impl Reply, Infallible> {
    let entries: Vec<ListEntry> = state
        .manager
        .list(query.filter_dir.as_deref(), query.limit)
        .await;
    Ok(ok_json(&entries, StatusCode::OK))
}

// ============================================================================
// Helpers
// ============================================================================

fn ok_json<T: Serialize>(body: &T, code: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(body), code)
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
