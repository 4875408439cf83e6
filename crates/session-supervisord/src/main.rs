mod bridge;
mod routes;
mod state;

use std::net::SocketAddr;
use session_core::{EnvConfig, SessionManager};
use state::AppState;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warp::Filter;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("session_supervisord=info".parse().unwrap()))
        .init();

    let mut args = std::env::args().skip(1);
    let mut addr_arg: Option<String> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--addr" | "--bind" => addr_arg = args.next(),
            "-h" | "--help" => {
                println!("Usage: session-supervisord [--addr HOST:PORT]\nDefaults: addr=127.0.0.1:8088 (override with SESSION_SUPERVISOR_ADDR)");
                return;
            }
            other => {
                tracing::warn!("ignoring unrecognized argument: {}", other);
            }
        }
    }

    let config = EnvConfig::from_env();
    tracing::info!(
        max_sessions = config.max_sessions,
        approval_timeout_secs = config.approval_timeout.as_secs(),
        "loaded configuration"
    );

    let manager = SessionManager::new(config);
    bridge::spawn(manager.clone());

    let state = AppState::new(manager);
    let api_routes = routes::routes(state);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let routes = api_routes.with(cors);

    let addr: SocketAddr = addr_arg
        .or_else(|| std::env::var("SESSION_SUPERVISOR_ADDR").ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| ([127, 0, 0, 1], 8088).into());

    tracing::info!("starting session supervisor at http://{}", addr);
    warp::serve(routes).run(addr).await;
}
