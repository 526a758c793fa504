use serde_json::{Map, Value, json};

// -----------------------------------------------------------------------------
// ----- Capability keys -------------------------------------------------------

pub const CAP_AUT: &str = "aut";
pub const CAP_PLATFORM_VERSION: &str = "platformVersion";
pub const CAP_SCREEN_SIZE: &str = "screenSize";
pub const CAP_EMULATOR: &str = "emulator";
pub const CAP_SERIAL: &str = "serial";
pub const CAP_LOCALE: &str = "locale";
pub const CAP_DISPLAY: &str = "display";
pub const CAP_LAUNCH_ACTIVITY: &str = "launchActivity";
pub const CAP_PRE_SESSION_ADB_COMMANDS: &str = "preSessionAdbCommands";

/// The app id a client sends to get the embedded-webview browser instead of a
/// configured native app.
pub const WEBVIEW_BROWSER_AUT: &str = "android";

// -----------------------------------------------------------------------------
// ----- Capabilities ----------------------------------------------------------

/// A desired or negotiated capability set. Kept as raw JSON so that unknown
/// keys a client sends survive the round trip to the device server.
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    entries: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilitiesError {
    #[error("request body is not a JSON object")]
    BodyNotAnObject,

    #[error("request has no 'desiredCapabilities' object")]
    MissingDesiredCapabilities,

    #[error("capability '{key}' has an unexpected type")]
    BadType { key: &'static str },
}

// -----------------------------------------------------------------------------
// ----- Capabilities: Static --------------------------------------------------

impl Capabilities {
    /// Parse the `desiredCapabilities` member out of a new-session request
    /// body.
    pub fn from_new_session_payload(payload: &Value) -> Result<Self, CapabilitiesError> {
        let body = payload
            .as_object()
            .ok_or(CapabilitiesError::BodyNotAnObject)?;

        let desired = body
            .get("desiredCapabilities")
            .and_then(Value::as_object)
            .ok_or(CapabilitiesError::MissingDesiredCapabilities)?;

        Ok(Self {
            entries: desired.clone(),
        })
    }

    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

// -----------------------------------------------------------------------------
// ----- Capabilities: Public --------------------------------------------------

impl Capabilities {
    pub fn aut(&self) -> Option<&str> {
        self.str_cap(CAP_AUT)
    }

    pub fn platform_version(&self) -> Option<&str> {
        self.str_cap(CAP_PLATFORM_VERSION)
    }

    pub fn screen_size(&self) -> Option<&str> {
        self.str_cap(CAP_SCREEN_SIZE)
    }

    pub fn serial(&self) -> Option<&str> {
        self.str_cap(CAP_SERIAL)
    }

    pub fn locale(&self) -> Option<&str> {
        self.str_cap(CAP_LOCALE)
    }

    pub fn display(&self) -> Option<&str> {
        self.str_cap(CAP_DISPLAY)
    }

    pub fn launch_activity(&self) -> Option<&str> {
        self.str_cap(CAP_LAUNCH_ACTIVITY)
    }

    pub fn emulator(&self) -> Option<bool> {
        self.entries.get(CAP_EMULATOR).and_then(Value::as_bool)
    }

    /// Shell commands the client asked to run before the session starts.
    /// Non-string array members are ignored.
    pub fn pre_session_adb_commands(&self) -> Vec<String> {
        self.entries
            .get(CAP_PRE_SESSION_ADB_COMMANDS)
            .and_then(Value::as_array)
            .map(|cmds| {
                cmds.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True when the client requested the embedded-webview browser type, which
    /// makes session bring-up switch to the webview context automatically.
    pub fn wants_webview(&self) -> bool {
        self.aut() == Some(WEBVIEW_BROWSER_AUT)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_owned(), value);
    }

    pub fn as_json(&self) -> Value {
        Value::Object(self.entries.clone())
    }
}

fn is_str_or_absent(entries: &Map<String, Value>, key: &str) -> bool {
    match entries.get(key) {
        None | Some(Value::String(_)) => true,
        Some(_) => false,
    }
}

impl Capabilities {
    /// Reject capability values of the wrong JSON type up front, so bad input
    /// fails the session before a device is touched.
    pub fn validate(&self) -> Result<(), CapabilitiesError> {
        for key in [
            CAP_AUT,
            CAP_PLATFORM_VERSION,
            CAP_SCREEN_SIZE,
            CAP_SERIAL,
            CAP_LOCALE,
            CAP_LAUNCH_ACTIVITY,
        ] {
            if !is_str_or_absent(&self.entries, key) {
                return Err(CapabilitiesError::BadType { key });
            }
        }

        if let Some(emulator) = self.entries.get(CAP_EMULATOR) {
            if !emulator.is_boolean() {
                return Err(CapabilitiesError::BadType { key: CAP_EMULATOR });
            }
        }

        Ok(())
    }

    fn str_cap(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }
}

// -----------------------------------------------------------------------------
// ----- FindStrategy ----------------------------------------------------------

/// Element-locator strategies the hub itself issues against the device server
/// (webview marker polling). Explicit variants instead of stringly-typed
/// dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindStrategy {
    ClassName,
    Id,
}

impl FindStrategy {
    pub fn wire_name(self) -> &'static str {
        match self {
            FindStrategy::ClassName => "class name",
            FindStrategy::Id => "id",
        }
    }

    pub fn locator(self, value: &str) -> Value {
        json!({ "using": self.wire_name(), "value": value })
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
