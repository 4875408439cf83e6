//! Approval callback bridge: the loopback HTTP listener that
//! `ApprovalChannel::CallbackBridge` families POST their permission requests
//! to.
//!
//! Kept separate from `routes.rs`'s six tool operations since it is driven
//! by the agent subprocess itself rather than an operator, and binds its own
//! ephemeral port rather than sharing the adapter's listen address.

use serde::{Deserialize, Serialize};
use session_core::manager::SessionManager;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::{http::StatusCode, Filter, Reply};

#[derive(Debug, Deserialize)]
struct PermissionRequest {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "toolName")]
    tool_name: String,
    #[serde(rename = "toolInput", default)]
    tool_input: serde_json::Value,
    #[allow(dead_code)]
    #[serde(rename = "requestId", default)]
    request_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn with_manager(
    manager: Arc<SessionManager>,
) -> impl Filter<Extract = (Arc<SessionManager>,), Error = Infallible> + Clone {
    warp::any().map(move || manager.clone())
}

fn routes(manager: Arc<SessionManager>) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    warp::path("permission")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_manager(manager))
        .and_then(handle_permission)
}

async fn handle_permission(
    request: PermissionRequest,
    manager: Arc<SessionManager>,
) -> Result<impl Reply, Infallible> {
    let result = manager
        .handle_bridge_approval(&request.session_id, request.tool_name, request.tool_input)
        .await;

    match result {
        Ok(body) => Ok(warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)),
        Err(err) => {
            tracing::warn!("approval bridge request failed: {}", err);
            Ok(warp::reply::with_status(
                warp::reply::json(&ErrorResponse { error: err.to_string() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn handle_rejection(err: warp::Rejection) -> Result<impl Reply, Infallible> {
    if err.is_not_found() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&ErrorResponse { error: "not found".to_string() }),
            StatusCode::NOT_FOUND,
        ));
    }
    if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&ErrorResponse { error: "invalid request body".to_string() }),
            StatusCode::BAD_REQUEST,
        ));
    }
    tracing::error!(?err, "unhandled rejection in approval bridge");
    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse { error: "internal error".to_string() }),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}

/// Bind the bridge on an OS-assigned loopback port, register the bound
/// address with `manager` so `families::claude`'s `build_command` can wire
/// it into the spawned process's environment, and spawn the server task.
///
/// Must complete before any `CallbackBridge` family session is started.
pub fn spawn(manager: Arc<SessionManager>) -> SocketAddr {
    let routes = routes(manager.clone()).recover(handle_rejection);
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    manager.set_bridge_addr(addr);
    tokio::spawn(server);
    tracing::info!(%addr, "approval bridge listening");
    addr
}
