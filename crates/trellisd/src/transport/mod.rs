//! HTTP surface mounting the manager's route table under `/plugins`.
//!
//! Every route takes an optional JSON body and answers with JSON. Handlers
//! run on the blocking pool because installs clone repositories and build
//! environments synchronously.

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tracing::{debug, error};

use crate::manager::{Method, PluginManager, Reply, Route};

#[cfg(test)]
mod tests;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Path every route is mounted below.
pub const MOUNT_POINT: &str = "/plugins";

/// Builds the router serving `manager`'s route table.
#[must_use]
pub fn router(manager: Arc<PluginManager>) -> Router {
    let mut router = Router::new();
    for &route in manager.routes() {
        let handler = move |State(manager): State<Arc<PluginManager>>, body: Bytes| {
            handle(route, manager, body)
        };
        let method_router = match route.method {
            Method::Get => get(handler),
            Method::Post => post(handler),
        };
        router = router.route(&mount_path(route.suffix), method_router);
    }
    router
        .fallback(|| async { error_response(StatusCode::NOT_FOUND, "Not found.") })
        .with_state(manager)
}

/// Serves `manager` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the IO error that stopped the accept loop.
pub async fn serve<F>(
    listener: TcpListener,
    manager: Arc<PluginManager>,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(manager))
        .with_graceful_shutdown(shutdown)
        .await
}

fn mount_path(suffix: &str) -> String {
    if suffix.is_empty() {
        String::from(MOUNT_POINT)
    } else {
        format!("{MOUNT_POINT}/{suffix}")
    }
}

async fn handle(route: Route, manager: Arc<PluginManager>, body: Bytes) -> Response {
    let params = match decode_body(&body) {
        Ok(params) => params,
        Err(err) => {
            debug!(
                target: TRANSPORT_TARGET,
                route = route.suffix,
                error = %err,
                "rejected request body"
            );
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body.");
        }
    };
    match tokio::task::spawn_blocking(move || route.invoke(&manager, &params)).await {
        Ok(reply) => reply_response(reply),
        Err(err) => {
            error!(
                target: TRANSPORT_TARGET,
                route = route.suffix,
                error = %err,
                "request handler did not complete"
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error.")
        }
    }
}

/// Treats an empty or whitespace-only body as `{}`.
fn decode_body(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body)
}

fn reply_response(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
