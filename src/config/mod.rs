use std::time::Duration;

pub mod cli;
pub mod inventory;
pub mod types;

pub use cli::CliConfig;
pub use inventory::{AppEntry, DeviceEntry, Inventory, InventoryError};
pub use types::LogLevel;

// -----------------------------------------------------------------------------
// ----- HubSettings -----------------------------------------------------------

/// Everything the hub needs to know that is not an app or a device. Built once
/// at startup and passed by reference; nothing here changes at runtime.
#[derive(Clone, Debug)]
pub struct HubSettings {
    pub server_version: String,
    pub emulator_hostname: String,
    pub emulator_options: Option<String>,
    pub device_log_level: String,
    pub new_session_retries: u32,
    pub force_reinstall: bool,
    pub session_timeout: Duration,
    pub emulator_start_timeout: Duration,
    pub server_start_timeout: Duration,
    pub server_poll_interval: Duration,
    pub webview_switch_timeout: Duration,
    pub server_port_base: u16,
    pub emulator_port_base: u16,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            server_version: env!("CARGO_PKG_VERSION").to_owned(),
            emulator_hostname: "localhost".to_owned(),
            emulator_options: None,
            device_log_level: "INFO".to_owned(),
            new_session_retries: 3,
            force_reinstall: false,
            session_timeout: Duration::from_secs(30 * 60),
            emulator_start_timeout: Duration::from_secs(300),
            server_start_timeout: Duration::from_secs(20),
            server_poll_interval: Duration::from_secs(2),
            webview_switch_timeout: Duration::from_secs(60),
            server_port_base: 38080,
            emulator_port_base: 5554,
        }
    }
}

impl HubSettings {
    pub fn from_cli(cli: &CliConfig, inventory: &Inventory) -> Self {
        Self {
            emulator_hostname: cli.emulator_hostname.clone(),
            emulator_options: inventory.hub.emulator_options.clone(),
            device_log_level: cli.log_level.device_tag().to_owned(),
            new_session_retries: cli.new_session_retries,
            force_reinstall: cli.force_reinstall,
            session_timeout: cli.session_timeout,
            emulator_start_timeout: cli.emulator_start_timeout,
            server_start_timeout: cli.server_start_timeout,
            server_port_base: cli.server_port_base,
            emulator_port_base: cli.emulator_port_base,
            ..Self::default()
        }
    }

    /// Last port of the emulator console window.
    pub fn emulator_port_max(&self) -> u16 {
        self.emulator_port_base + 30
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
