use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::debug;

use super::app::AndroidApp;
use super::builder::server_package_for;
use super::device::{AndroidError, DeviceHandle, DeviceRecord, EmulatorLaunch};

/// Port the instrumentation server listens on inside the device.
const DEVICE_SERVER_PORT: u16 = 8080;

const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// -----------------------------------------------------------------------------
// ----- AdbDevice -------------------------------------------------------------

/// A `DeviceHandle` backed by the adb and emulator command-line tools. Every
/// method is one tool invocation; orchestration decisions live in the hub.
#[derive(Debug)]
pub struct AdbDevice {
    record: DeviceRecord,
    adb: PathBuf,
    emulator: PathBuf,
    /// Package and host port of the last instrumentation server started here.
    server: Mutex<Option<(String, u16)>>,
}

impl AdbDevice {
    pub fn new(record: DeviceRecord, adb: PathBuf, emulator: PathBuf) -> Self {
        Self {
            record,
            adb,
            emulator,
            server: Mutex::new(None),
        }
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    async fn adb_raw(&self, args: &[&str]) -> Result<Vec<u8>, AndroidError> {
        let output = Command::new(&self.adb)
            .arg("-s")
            .arg(&self.record.id)
            .args(args)
            .output()
            .await
            .map_err(|source| AndroidError::Io {
                device: self.record.id.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AndroidError::CommandFailed {
                command: format!("adb {}", args.join(" ")),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(output.stdout)
    }

    async fn adb(&self, args: &[&str]) -> Result<String, AndroidError> {
        let stdout = self.adb_raw(args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_owned())
    }
}

// -----------------------------------------------------------------------------
// ----- AdbDevice: DeviceHandle -----------------------------------------------

#[async_trait]
impl DeviceHandle for AdbDevice {
    async fn is_ready(&self) -> bool {
        matches!(
            self.adb(&["shell", "getprop", "sys.boot_completed"]).await,
            Ok(value) if value == "1"
        )
    }

    async fn install(&self, app: &AndroidApp) -> Result<(), AndroidError> {
        let apk = app.apk_path.display().to_string();
        self.adb(&["install", "-r", apk.as_str()]).await.map(|_| ())
    }

    async fn is_installed(&self, app: &AndroidApp) -> Result<bool, AndroidError> {
        let listing = self
            .adb(&["shell", "pm", "list", "packages", app.base_package.as_str()])
            .await?;
        let wanted = format!("package:{}", app.base_package);
        Ok(listing.lines().any(|line| line.trim() == wanted))
    }

    async fn start(&self, launch: &EmulatorLaunch) -> Result<(), AndroidError> {
        let port = launch.console_port.to_string();
        let mut cmd = Command::new(&self.emulator);
        cmd.args(["-avd", self.record.id.as_str(), "-port", port.as_str()]);

        if let Some(locale) = &launch.locale {
            let (language, country) = locale.split_once('_').unwrap_or((locale.as_str(), ""));
            cmd.args(["-prop", format!("persist.sys.language={language}").as_str()]);
            if !country.is_empty() {
                cmd.args(["-prop", format!("persist.sys.country={country}").as_str()]);
            }
        }
        if let Some(display) = &launch.display {
            cmd.args(["-prop", format!("droidhub.display={display}").as_str()]);
        }
        if let Some(options) = &launch.options {
            cmd.args(options.split_whitespace());
        }

        debug!("booting emulator {} on console port {port}", self.record.id);
        cmd.spawn().map_err(|source| AndroidError::Io {
            device: self.record.id.clone(),
            source,
        })?;

        // Callers bound this wait with their own timeout.
        while !self.is_ready().await {
            sleep(BOOT_POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn start_instrumentation_server(
        &self,
        app: &AndroidApp,
        port: u16,
    ) -> Result<(), AndroidError> {
        self.forward_port(port, DEVICE_SERVER_PORT).await?;

        let server_package = server_package_for(app);
        let component = format!("{server_package}/{server_package}.ServerInstrumentation");
        self.adb(&[
            "shell",
            "am",
            "instrument",
            "-e",
            "main_activity",
            &app.main_activity,
            &component,
        ])
        .await?;

        *self.server.lock() = Some((server_package, port));
        Ok(())
    }

    async fn is_instrumentation_server_running(&self) -> bool {
        let Some((package, _)) = self.server.lock().clone() else {
            return false;
        };
        matches!(
            self.adb(&["shell", "ps"]).await,
            Ok(listing) if listing.contains(&package)
        )
    }

    async fn crash_log(&self) -> String {
        self.adb(&["logcat", "-d", "-s", "AndroidRuntime:E"])
            .await
            .map(|log| {
                // logcat always prints a beginning-of-buffer banner
                let interesting: Vec<&str> = log
                    .lines()
                    .filter(|line| !line.starts_with("--------- beginning of"))
                    .collect();
                interesting.join("\n").trim().to_owned()
            })
            .unwrap_or_default()
    }

    async fn run_shell_command(&self, command: &str) -> Result<String, AndroidError> {
        let args: Vec<&str> = command.split_whitespace().collect();
        if args.is_empty() {
            return Err(AndroidError::Other("empty device command".to_owned()));
        }
        self.adb(&args).await
    }

    async fn forward_port(&self, local: u16, remote: u16) -> Result<(), AndroidError> {
        self.adb(&["forward", &format!("tcp:{local}"), &format!("tcp:{remote}")])
            .await
            .map(|_| ())
    }

    async fn list_third_party_processes(&self) -> String {
        self.adb(&["shell", "pm", "list", "packages", "-3"])
            .await
            .unwrap_or_default()
    }

    async fn take_screenshot(&self) -> Result<Vec<u8>, AndroidError> {
        self.adb_raw(&["exec-out", "screencap", "-p"]).await
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
