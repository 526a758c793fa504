use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::HubError;
use crate::hub::Hub;
use crate::router::{WdHandler, WdRequest};
use crate::session::ActiveSession;
use crate::wire::{StatusCode, WireResponse};

/// Forward attempts per proxied command, with no back-off between attempts.
const FORWARD_ATTEMPTS: u32 = 3;

// -----------------------------------------------------------------------------
// ----- ProxyToDevice ---------------------------------------------------------

/// Forwards any session-scoped WebDriver command as-is to the session's
/// instrumentation server and classifies failures.
pub struct ProxyToDevice {
    hub: Arc<Hub>,
}

impl ProxyToDevice {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

enum ForwardReply {
    /// The device server answered HTTP 404: the command is unknown to it.
    UnknownCommand,
    /// A regular `{status, value}` envelope from the device server.
    Envelope(Value),
}

#[async_trait]
impl WdHandler for ProxyToDevice {
    async fn handle(&self, request: &WdRequest) -> Result<WireResponse, HubError> {
        let Some(session_id) = request.session_id.clone() else {
            return Ok(WireResponse::error(
                None,
                StatusCode::UnknownError,
                "no session id passed to the request",
            ));
        };

        // Known-bad sessions fail fast: no network I/O ever happens for them.
        let Some(session) = self.hub.sessions().get(&session_id) else {
            return Ok(WireResponse::error(
                Some(session_id.clone()),
                StatusCode::UnknownError,
                format!("no session found for id {session_id}"),
            ));
        };
        if session.is_invalid() {
            return Ok(WireResponse::error(
                Some(session_id),
                StatusCode::UnknownError,
                "the test session has been marked as invalid; this happens when \
                 a device is disconnected while a test session is still active on it",
            ));
        }

        let url = session.server_url(&request.uri);
        debug!("forwarding {} {} to the device server", request.method, url);

        let mut last_error = String::new();
        for attempt in 1..=FORWARD_ATTEMPTS {
            match self.forward_once(request, &url).await {
                Ok(reply) => return Ok(unwrap_reply(session_id, reply)),
                Err(error) => {
                    warn!(
                        "failed to forward request to the device server \
                         (attempt {attempt}/{FORWARD_ATTEMPTS}): {error}"
                    );
                    last_error = error;
                }
            }
        }

        Ok(self.classify_failure(&session_id, &session, &last_error).await)
    }
}

// -----------------------------------------------------------------------------
// ----- ProxyToDevice: Private ------------------------------------------------

impl ProxyToDevice {
    async fn forward_once(&self, request: &WdRequest, url: &str) -> Result<ForwardReply, String> {
        let mut builder = self.hub.http().request(request.method.clone(), url);
        if !request.body.is_empty() {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(request.body.clone());
        }

        let response = builder.send().await.map_err(|err| err.to_string())?;
        if response.status().as_u16() == 404 {
            return Ok(ForwardReply::UnknownCommand);
        }

        let envelope: Value = response.json().await.map_err(|err| err.to_string())?;
        Ok(ForwardReply::Envelope(envelope))
    }

    /// All attempts failed. Decide what to tell the client: app crash (with
    /// the crash log), unreachable device (with its process list), or a plain
    /// transport failure.
    async fn classify_failure(
        &self,
        session_id: &str,
        session: &ActiveSession,
        last_error: &str,
    ) -> WireResponse {
        let crash = session.handle().crash_log().await;
        if !crash.is_empty() {
            return WireResponse::error(
                Some(session_id.to_owned()),
                StatusCode::UnknownError,
                format!("the app under test crashed:\n{crash}"),
            );
        }

        if !session.handle().is_ready().await {
            let processes = session.handle().list_third_party_processes().await;
            self.hub.invalidate_session(session_id);
            return WireResponse::error(
                Some(session_id.to_owned()),
                StatusCode::UnknownError,
                format!(
                    "the device became unreachable while forwarding the command; \
                     third-party packages on the device:\n{processes}"
                ),
            );
        }

        WireResponse::error(
            Some(session_id.to_owned()),
            StatusCode::UnknownError,
            format!(
                "error communicating with the instrumentation server on the device: {last_error}"
            ),
        )
    }
}

fn unwrap_reply(session_id: String, reply: ForwardReply) -> WireResponse {
    match reply {
        ForwardReply::UnknownCommand => WireResponse::passthrough(
            Some(session_id),
            StatusCode::UnknownCommand.code(),
            Value::Null,
        ),
        ForwardReply::Envelope(envelope) => {
            // The numeric status passes through unchanged; the hub's session id
            // replaces whatever the device put there.
            let status = envelope["status"]
                .as_u64()
                .unwrap_or_else(|| u64::from(StatusCode::UnknownError.code()))
                as u16;
            let value = envelope.get("value").cloned().unwrap_or(Value::Null);
            WireResponse::passthrough(Some(session_id), status, value)
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
