use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;

use clap::Parser;

use super::types::LogLevel;

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub inventory_file: PathBuf,
    pub adb: PathBuf,
    pub emulator: PathBuf,
    pub new_session_retries: u32,
    pub session_timeout: Duration,
    pub emulator_start_timeout: Duration,
    pub server_start_timeout: Duration,
    pub emulator_hostname: String,
    pub server_port_base: u16,
    pub emulator_port_base: u16,
    pub force_reinstall: bool,
}

impl CliConfig {
    pub fn load() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"));
        let cfg = Self::from_args(args);
        cfg.validate();
        cfg
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args(args: Args) -> Self {
        Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            log_level: args.log_level,
            inventory_file: args.inventory,
            adb: args.adb,
            emulator: args.emulator,
            new_session_retries: args.retries,
            session_timeout: args.session_timeout,
            emulator_start_timeout: args.emulator_start_timeout,
            server_start_timeout: args.server_start_timeout,
            emulator_hostname: args.emulator_hostname,
            server_port_base: args.server_port,
            emulator_port_base: args.emulator_port,
            force_reinstall: args.force_reinstall,
        }
    }

    fn validate(&self) {
        must_exist_file(&self.inventory_file, "--inventory / droidhub.toml");
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "droidhub", version, about = "Android WebDriver hub")]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1).
    #[arg(long = "host", short = 'H', env = "DROIDHUB_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(long = "port", short = 'p', env = "DROIDHUB_PORT", default_value_t = 4444)]
    port: u16,

    #[arg(long = "log", default_value = "info")]
    log_level: LogLevel,

    // Must exist; no default.
    #[arg(long = "inventory", env = "DROIDHUB_INVENTORY")]
    inventory: PathBuf,

    #[arg(long = "adb", env = "DROIDHUB_ADB", default_value = "adb")]
    adb: PathBuf,

    #[arg(long = "emulator-bin", env = "DROIDHUB_EMULATOR", default_value = "emulator")]
    emulator: PathBuf,

    // Failed session bring-ups are re-run this many times with a fresh device.
    #[arg(long = "retries", default_value_t = 3)]
    retries: u32,

    #[arg(long = "session-timeout", value_parser = humantime::parse_duration, default_value = "30m")]
    session_timeout: Duration,

    #[arg(long = "emulator-start-timeout", value_parser = humantime::parse_duration, default_value = "300s")]
    emulator_start_timeout: Duration,

    #[arg(long = "server-start-timeout", value_parser = humantime::parse_duration, default_value = "20s")]
    server_start_timeout: Duration,

    // Hostname the instrumentation servers are reached on once their port is
    // forwarded.
    #[arg(long = "emulator-hostname", default_value = "localhost")]
    emulator_hostname: String,

    // First forward port handed to instrumentation servers.
    #[arg(long = "server-port", default_value_t = 38080)]
    server_port: u16,

    // First port of the emulator console window (window spans 30 ports).
    #[arg(long = "emulator-port", default_value_t = 5554)]
    emulator_port: u16,

    #[arg(long = "force-reinstall")]
    force_reinstall: bool,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
