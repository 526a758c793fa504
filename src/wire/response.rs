use serde_json::{Value, json};

use super::status::StatusCode;

// -----------------------------------------------------------------------------
// ----- WireResponse ----------------------------------------------------------

/// The fixed WebDriver response envelope: `{"sessionId"?, "status", "value"?}`.
///
/// `status` is carried as the raw protocol number so that proxied device
/// responses pass through unchanged even for codes this server never emits
/// itself.
#[derive(Clone, Debug)]
pub struct WireResponse {
    session_id: Option<String>,
    status: u16,
    value: Value,
}

// -----------------------------------------------------------------------------
// ----- WireResponse: Static --------------------------------------------------

impl WireResponse {
    pub fn success(session_id: impl Into<Option<String>>, value: Value) -> Self {
        Self {
            session_id: session_id.into(),
            status: StatusCode::Success.code(),
            value,
        }
    }

    pub fn error(
        session_id: impl Into<Option<String>>,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            status: status.code(),
            value: json!({ "message": message.into() }),
        }
    }

    /// A passthrough envelope for responses unwrapped from the device server.
    pub fn passthrough(session_id: impl Into<Option<String>>, status: u16, value: Value) -> Self {
        Self {
            session_id: session_id.into(),
            status,
            value,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- WireResponse: Public --------------------------------------------------

impl WireResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Render the envelope. `sessionId` is omitted when absent and `value` is
    /// omitted when null, matching what wire clients expect.
    pub fn to_json(&self) -> Value {
        let mut body = serde_json::Map::new();
        if let Some(id) = &self.session_id {
            body.insert("sessionId".into(), json!(id));
        }
        body.insert("status".into(), json!(self.status));
        if !self.value.is_null() {
            body.insert("value".into(), self.value.clone());
        }
        Value::Object(body)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
