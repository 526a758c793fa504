use std::sync::Arc;

use axum::Router as HttpShell;
use axum::body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode as HttpStatus, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error};

use crate::errors::HubError;
use crate::hub::Hub;
use crate::proxy::ProxyToDevice;
use crate::router::{Dispatch, Router, WdHandler, WdRequest, extract_param};
use crate::wire::WireResponse;

pub mod handlers;

use handlers::{
    CaptureScreenshot, CreateSession, DeleteSession, ExecuteShellCommand, GetCapabilities,
    ListSessions, Status,
};

/// Upper bound on accepted request bodies. WebDriver payloads are small;
/// anything near this is abuse.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const SESSION_TEMPLATE: &str = "/wd/hub/session/:sessionId";
const SESSION_PREFIX: &str = "/wd/hub/session/";

// -----------------------------------------------------------------------------
// ----- Route table -----------------------------------------------------------

/// All hub routes. Registration order is dispatch order.
pub fn wd_router(hub: &Arc<Hub>) -> Router {
    let mut router = Router::new();

    router.register(
        Method::POST,
        "/wd/hub/session",
        Arc::new(CreateSession::new(hub.clone())),
    );
    router.register(
        Method::GET,
        "/wd/hub/sessions",
        Arc::new(ListSessions::new(hub.clone())),
    );
    router.register(
        Method::GET,
        "/wd/hub/status",
        Arc::new(Status::new(hub.clone())),
    );
    router.register(
        Method::GET,
        SESSION_TEMPLATE,
        Arc::new(GetCapabilities::new(hub.clone())),
    );
    router.register(
        Method::DELETE,
        SESSION_TEMPLATE,
        Arc::new(DeleteSession::new(hub.clone())),
    );
    router.register(
        Method::GET,
        "/wd/hub/session/:sessionId/screenshot",
        Arc::new(CaptureScreenshot::new(hub.clone())),
    );
    router.register(
        Method::POST,
        "/wd/hub/session/:sessionId/droidhub/adb/executeShellCommand",
        Arc::new(ExecuteShellCommand::new(hub.clone())),
    );

    // Every other session-scoped path goes to the device server verbatim.
    router.register_redirect(SESSION_PREFIX, Arc::new(ProxyToDevice::new(hub.clone())));

    router
}

// -----------------------------------------------------------------------------
// ----- HTTP shell ------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    router: Arc<Router>,
}

/// The HTTP application. axum only provides connection and body plumbing; all
/// dispatch goes through the hub's own router via this single catch-all.
pub fn app(hub: Arc<Hub>) -> HttpShell {
    let state = AppState {
        router: Arc::new(wd_router(&hub)),
    };
    HttpShell::new().fallback(dispatch).with_state(state)
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    // No matching route and no redirect prefix: a bare 404, no JSON envelope.
    let Some(matched) = state.router.dispatch(&method, &uri) else {
        debug!("no handler for {method} {uri}");
        return HttpStatus::NOT_FOUND.into_response();
    };

    let bytes = match body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return HttpStatus::PAYLOAD_TOO_LARGE.into_response(),
    };

    let (handler, session_id) = match matched {
        Dispatch::Route(route) => {
            let session_id = route.param(&uri, "sessionId");
            (route.handler().clone(), session_id)
        }
        Dispatch::Redirect(handler) => {
            let session_id = extract_param(SESSION_TEMPLATE, &uri, "sessionId", false);
            (handler, session_id)
        }
    };

    let wd_request = WdRequest {
        method,
        uri,
        session_id,
        body: bytes,
    };

    match handler.handle(&wd_request).await {
        Ok(reply) => envelope_response(HttpStatus::OK, &reply),
        // Classified failures still answer 200 with a nonzero envelope
        // status; only unexpected internal errors become a 500, and even
        // those carry a JSON body.
        Err(HubError::Internal(message)) => {
            error!("internal error handling {} {}: {message}", wd_request.method, wd_request.uri);
            let body = json!({
                "status": crate::wire::StatusCode::UnknownError.code(),
                "value": { "message": "internal server error" },
            });
            json_response(HttpStatus::INTERNAL_SERVER_ERROR, body)
        }
        Err(err) => {
            let reply = WireResponse::error(
                wd_request.session_id.clone(),
                err.status_code(),
                err.to_string(),
            );
            envelope_response(HttpStatus::OK, &reply)
        }
    }
}

fn envelope_response(status: HttpStatus, reply: &WireResponse) -> Response {
    json_response(status, reply.to_json())
}

fn json_response(status: HttpStatus, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

// -----------------------------------------------------------------------------
// ----- Serving ---------------------------------------------------------------

/// Bind and serve until `shutdown` resolves. Returns once the listener closes.
pub async fn serve(
    hub: Arc<Hub>,
    listener: tokio::net::TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, app(hub))
        .with_graceful_shutdown(shutdown)
        .await
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
