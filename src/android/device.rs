use async_trait::async_trait;
use thiserror::Error;

use super::app::AndroidApp;

// -----------------------------------------------------------------------------
// ----- AndroidError ----------------------------------------------------------

#[derive(Debug, Error)]
pub enum AndroidError {
    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("device '{device}' i/o error: {source}")]
    Io {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

// -----------------------------------------------------------------------------
// ----- DeviceRecord ----------------------------------------------------------

/// Identity and matching data of one device or emulator in the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Serial number for hardware, AVD name for emulators.
    pub id: String,
    /// Target Android platform (API level, e.g. "19").
    pub platform: String,
    /// Screen size as "WxH", e.g. "320x480".
    pub screen_size: String,
    pub emulator: bool,
}

impl DeviceRecord {
    /// A device matches when the request names no screen size or names this
    /// one exactly.
    pub fn screen_size_matches(&self, requested: Option<&str>) -> bool {
        match requested {
            None => true,
            Some(size) => self.screen_size == size,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- EmulatorLaunch --------------------------------------------------------

/// Options for booting an emulator that is not yet running.
#[derive(Clone, Debug, Default)]
pub struct EmulatorLaunch {
    pub locale: Option<String>,
    /// Emulator console port, taken from the pool's port window.
    pub console_port: u16,
    /// Raw extra emulator flags, e.g. "-no-audio -no-window".
    pub options: Option<String>,
    pub display: Option<String>,
}

// -----------------------------------------------------------------------------
// ----- DeviceHandle ----------------------------------------------------------

/// Capability surface of one Android device or emulator. The hub core only
/// ever talks to devices through this trait so tests can fake them; concrete
/// implementations shell out to platform tooling.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    /// Whether the device is online and finished booting.
    async fn is_ready(&self) -> bool;

    async fn install(&self, app: &AndroidApp) -> Result<(), AndroidError>;

    async fn is_installed(&self, app: &AndroidApp) -> Result<bool, AndroidError>;

    /// Boot the emulator and block until it is ready. Callers bound this with
    /// a timeout; implementations may poll indefinitely.
    async fn start(&self, launch: &EmulatorLaunch) -> Result<(), AndroidError>;

    /// Launch the instrumentation server for `app`, reachable on the host at
    /// `port` once up.
    async fn start_instrumentation_server(
        &self,
        app: &AndroidApp,
        port: u16,
    ) -> Result<(), AndroidError>;

    async fn is_instrumentation_server_running(&self) -> bool;

    /// The crash log of the app under test; empty when there was no crash.
    async fn crash_log(&self) -> String;

    /// Run one adb invocation against this device, e.g.
    /// "shell setprop log.tag.DROIDHUB DEBUG". Returns captured output.
    async fn run_shell_command(&self, command: &str) -> Result<String, AndroidError>;

    async fn forward_port(&self, local: u16, remote: u16) -> Result<(), AndroidError>;

    /// Human-readable list of third-party processes, used in unreachable-device
    /// diagnostics.
    async fn list_third_party_processes(&self) -> String;

    /// PNG screenshot bytes.
    async fn take_screenshot(&self) -> Result<Vec<u8>, AndroidError>;
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
