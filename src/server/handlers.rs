use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::error;

use crate::errors::HubError;
use crate::hub::Hub;
use crate::router::{WdHandler, WdRequest};
use crate::wire::{StatusCode, WireResponse};

// -----------------------------------------------------------------------------
// ----- CreateSession ---------------------------------------------------------

/// POST /wd/hub/session: run the bring-up pipeline.
pub struct CreateSession {
    hub: Arc<Hub>,
}

impl CreateSession {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl WdHandler for CreateSession {
    async fn handle(&self, request: &WdRequest) -> Result<WireResponse, HubError> {
        let payload = match request.payload() {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(WireResponse::error(
                    Some(String::new()),
                    StatusCode::SessionNotCreated,
                    err.to_string(),
                ));
            }
        };

        match self.hub.create_session(&payload).await {
            Ok(session_id) => {
                let caps = self
                    .hub
                    .session_capabilities(&session_id)
                    .unwrap_or(Value::Null);
                Ok(WireResponse::success(Some(session_id), caps))
            }
            Err(err) => {
                error!("error while creating new session: {err}");
                Ok(WireResponse::error(
                    Some(String::new()),
                    StatusCode::SessionNotCreated,
                    err.to_string(),
                ))
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ListSessions ----------------------------------------------------------

/// GET /wd/hub/sessions: ids and capabilities of every active session.
pub struct ListSessions {
    hub: Arc<Hub>,
}

impl ListSessions {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl WdHandler for ListSessions {
    async fn handle(&self, _request: &WdRequest) -> Result<WireResponse, HubError> {
        let sessions: Vec<Value> = self
            .hub
            .sessions()
            .list()
            .into_iter()
            .map(|session| {
                json!({
                    "id": session.session_id(),
                    "capabilities": session.capabilities().as_json(),
                })
            })
            .collect();
        Ok(WireResponse::success(None, Value::Array(sessions)))
    }
}

// -----------------------------------------------------------------------------
// ----- GetCapabilities -------------------------------------------------------

/// GET /wd/hub/session/:sessionId: the session's negotiated capabilities.
pub struct GetCapabilities {
    hub: Arc<Hub>,
}

impl GetCapabilities {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl WdHandler for GetCapabilities {
    async fn handle(&self, request: &WdRequest) -> Result<WireResponse, HubError> {
        let session_id = required_session_id(request)?;
        match self.hub.session_capabilities(&session_id) {
            Some(caps) => Ok(WireResponse::success(Some(session_id), caps)),
            None => Ok(session_not_found(session_id)),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- DeleteSession ---------------------------------------------------------

/// DELETE /wd/hub/session/:sessionId: stop the session, release its device.
pub struct DeleteSession {
    hub: Arc<Hub>,
}

impl DeleteSession {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl WdHandler for DeleteSession {
    async fn handle(&self, request: &WdRequest) -> Result<WireResponse, HubError> {
        let session_id = required_session_id(request)?;
        if self.hub.stop_session(&session_id).await {
            Ok(WireResponse::success(Some(session_id), Value::Null))
        } else {
            Ok(session_not_found(session_id))
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Status ----------------------------------------------------------------

/// GET /wd/hub/status: server build/os info plus the app and device
/// inventory. Never requires an active session.
pub struct Status {
    hub: Arc<Hub>,
}

impl Status {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl WdHandler for Status {
    async fn handle(&self, _request: &WdRequest) -> Result<WireResponse, HubError> {
        let value = json!({
            "build": {
                "version": self.hub.settings().server_version,
                "browserName": "droidhub",
            },
            "os": {
                "arch": std::env::consts::ARCH,
                "name": std::env::consts::OS,
            },
            "supportedApps": self.hub.supported_apps(),
            "supportedDevices": self.hub.supported_devices(),
        });
        Ok(WireResponse::success(None, value))
    }
}

// -----------------------------------------------------------------------------
// ----- CaptureScreenshot -----------------------------------------------------

/// GET /wd/hub/session/:sessionId/screenshot: host-side screenshot, base64.
pub struct CaptureScreenshot {
    hub: Arc<Hub>,
}

impl CaptureScreenshot {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl WdHandler for CaptureScreenshot {
    async fn handle(&self, request: &WdRequest) -> Result<WireResponse, HubError> {
        let session_id = required_session_id(request)?;
        let Some(session) = self.hub.sessions().get(&session_id) else {
            return Ok(session_not_found(session_id));
        };

        match session.handle().take_screenshot().await {
            Ok(png) => Ok(WireResponse::success(
                Some(session_id),
                json!(BASE64.encode(png)),
            )),
            Err(err) => Ok(WireResponse::error(
                Some(session_id),
                StatusCode::UnknownError,
                format!("screenshot failed: {err}"),
            )),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ExecuteShellCommand ---------------------------------------------------

/// POST /wd/hub/session/:sessionId/droidhub/adb/executeShellCommand: run one
/// device command for the session's device and return its output.
pub struct ExecuteShellCommand {
    hub: Arc<Hub>,
}

impl ExecuteShellCommand {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl WdHandler for ExecuteShellCommand {
    async fn handle(&self, request: &WdRequest) -> Result<WireResponse, HubError> {
        let session_id = required_session_id(request)?;
        let Some(session) = self.hub.sessions().get(&session_id) else {
            return Ok(session_not_found(session_id));
        };

        let payload = request.payload()?;
        let Some(command) = payload["command"].as_str() else {
            return Ok(WireResponse::error(
                Some(session_id),
                StatusCode::UnknownError,
                "missing 'command' in request payload",
            ));
        };

        match session.handle().run_shell_command(command).await {
            Ok(output) => Ok(WireResponse::success(Some(session_id), json!(output))),
            Err(err) => Ok(WireResponse::error(
                Some(session_id),
                StatusCode::UnknownError,
                format!("device command failed: {err}"),
            )),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Shared helpers --------------------------------------------------------

fn required_session_id(request: &WdRequest) -> Result<String, HubError> {
    request
        .session_id
        .clone()
        .ok_or_else(|| HubError::Internal("route matched without a session id".to_owned()))
}

fn session_not_found(session_id: String) -> WireResponse {
    WireResponse::error(
        Some(session_id.clone()),
        StatusCode::UnknownError,
        format!("the session '{session_id}' was not found"),
    )
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
