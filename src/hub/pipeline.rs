use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::{Instant, sleep, timeout};
use tracing::{error, info, warn};

use super::Hub;
use crate::android::{AndroidApp, AndroidError, EmulatorLaunch};
use crate::errors::HubError;
use crate::pool::AllocatedDevice;
use crate::session::ActiveSession;
use crate::wire::{Capabilities, FindStrategy, StatusCode};

/// The instrumentation server needs a moment after its status endpoint starts
/// answering before it accepts a session.
const SERVER_SETTLE_DELAY: Duration = Duration::from_millis(500);

const WEBVIEW_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Class of the embedded webview widget the auto-switch waits for.
const WEBVIEW_CLASS: &str = "android.webkit.WebView";

/// The webview app embeds a marker element with this id; once it is visible
/// the webview context is usable.
const WEBVIEW_MARKER_ID: &str = "AndroidDriver";

// -----------------------------------------------------------------------------
// ----- Attempt failure -------------------------------------------------------

/// A failed bring-up attempt, together with the device it still holds so the
/// pipeline can run the compensating release before retrying.
struct AttemptFailure {
    device: Option<AllocatedDevice>,
    error: HubError,
}

// -----------------------------------------------------------------------------
// ----- Hub: Session creation -------------------------------------------------

impl Hub {
    /// Turn desired capabilities into a registered, addressable session.
    /// Returns the device-issued session id.
    pub async fn create_session(self: &Arc<Self>, payload: &Value) -> Result<String, HubError> {
        let retries = self.settings().new_session_retries;
        self.create_session_with_retries(payload, retries).await
    }

    /// As `create_session` with an explicit retry budget: the device-bound
    /// stages run up to `retries + 1` times.
    pub async fn create_session_with_retries(
        self: &Arc<Self>,
        payload: &Value,
        retries: u32,
    ) -> Result<String, HubError> {
        // Stage 1: parse and validate the requested capabilities.
        let desired = Capabilities::from_new_session_payload(payload)?;
        desired.validate()?;

        // Stage 2: resolve the app under test. Fails before any device state
        // is touched.
        let aut = desired.aut().ok_or_else(|| {
            HubError::SessionCreation("desired capabilities name no app under test".to_owned())
        })?;
        let mut app = self
            .apps()
            .resolve(aut)
            .cloned()
            .ok_or_else(|| {
                HubError::SessionCreation(format!(
                    "the requested app under test '{aut}' is not configured on this hub"
                ))
            })?;
        if let Some(activity) = desired.launch_activity() {
            app = app.with_main_activity(activity);
        }
        info!("'{aut}' will be used as app under test");

        // Stages 3-8 retry as a unit; each retry releases the held device
        // first and re-allocates. An explicit loop, bounded by the budget.
        let mut budget = retries;
        loop {
            match self.bring_up_attempt(&desired, &app).await {
                Ok(session_id) => return Ok(session_id),
                Err(AttemptFailure { device, error }) => {
                    if let Some(device) = device {
                        self.devices().release(&device.record.id);
                    }
                    if !error.is_retryable() || budget == 0 {
                        error!("session bring-up failed: {error}");
                        return Err(error);
                    }
                    warn!("session bring-up attempt failed, retrying: {error}");
                    budget -= 1;
                }
            }
        }
    }

    async fn bring_up_attempt(
        self: &Arc<Self>,
        desired: &Capabilities,
        app: &AndroidApp,
    ) -> Result<String, AttemptFailure> {
        // Stage 3: allocate. The only synchronization point for device state.
        let device = self.devices().allocate(desired).map_err(|err| AttemptFailure {
            device: None,
            error: err.into(),
        })?;

        match self.drive_device(&device, desired, app).await {
            Ok(session_id) => Ok(session_id),
            Err(error) => Err(AttemptFailure {
                device: Some(device),
                error,
            }),
        }
    }

    /// Stages 4-11 against an allocated device. Any error here makes the
    /// caller release the device.
    async fn drive_device(
        self: &Arc<Self>,
        device: &AllocatedDevice,
        desired: &Capabilities,
        app: &AndroidApp,
    ) -> Result<String, HubError> {
        let settings = self.settings();

        // Stage 4: boot the emulator if it is not already up.
        if device.record.emulator && !device.handle.is_ready().await {
            self.boot_emulator(device, desired).await?;
        }

        // Stage 5: make sure the app under test is installed.
        if settings.force_reinstall || !device.handle.is_installed(app).await? {
            device.handle.install(app).await?;
        } else {
            info!("the app under test is already installed");
        }

        // Stage 6: build (once per app id) and install the instrumentation
        // server.
        let server_apk = self.instrumentation_server_for(app).await?;
        if settings.force_reinstall || !device.handle.is_installed(&server_apk).await? {
            device.handle.install(&server_apk).await?;
        } else {
            info!("instrumentation server already installed for this app");
        }

        // Stage 7: device log level, then any capability-requested commands.
        let mut commands = vec![format!(
            "shell setprop log.tag.DROIDHUB {}",
            settings.device_log_level
        )];
        commands.extend(desired.pre_session_adb_commands());
        for command in &commands {
            device.handle.run_shell_command(command).await?;
        }

        // Stage 8: start the device server on a fresh port and wait for it.
        let port = self.next_server_port();
        device.handle.start_instrumentation_server(app, port).await?;
        self.wait_for_server(device, port).await?;
        sleep(SERVER_SETTLE_DELAY).await;

        // Stage 9: negotiate the WebDriver session. The server is confirmed
        // up, so a failure here is terminal, not transient.
        let host = settings.emulator_hostname.clone();
        let (session_id, negotiated) = self.negotiate_wd_session(&host, port, desired).await?;

        // Stage 10: register, keyed by the device-issued id.
        let session = Arc::new(ActiveSession::new(
            session_id.clone(),
            negotiated,
            app.clone(),
            device.record.clone(),
            device.handle.clone(),
            host,
            port,
        ));
        self.sessions().register(session.clone());
        self.arm_session_timeout(&session);

        // Stage 11: clients asking for the webview browser get switched into
        // the webview context before the session is handed back.
        if desired.wants_webview() {
            if let Err(error) = self.switch_to_webview(&session).await {
                self.sessions().remove(&session_id);
                session.cancel_timeout();
                return Err(HubError::SessionCreation(format!(
                    "webview switch failed: {error}"
                )));
            }
        }

        info!("session {session_id} is up on port {port}");
        Ok(session_id)
    }
}

// -----------------------------------------------------------------------------
// ----- Hub: Pipeline stages --------------------------------------------------

impl Hub {
    async fn boot_emulator(
        &self,
        device: &AllocatedDevice,
        desired: &Capabilities,
    ) -> Result<(), HubError> {
        let settings = self.settings();
        let console_port = self.devices().next_console_port().ok_or_else(|| {
            HubError::DeviceOperation(AndroidError::Other(
                "no free emulator console port".to_owned(),
            ))
        })?;

        let launch = EmulatorLaunch {
            locale: desired.locale().map(str::to_owned),
            console_port,
            options: settings.emulator_options.clone(),
            display: desired.display().map(str::to_owned),
        };

        info!("booting emulator {}", device.record.id);
        let boot = device.handle.start(&launch);
        match timeout(settings.emulator_start_timeout, boot).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.devices().release_console_port(console_port);
                Err(err.into())
            }
            Err(_) => {
                self.devices().release_console_port(console_port);
                Err(HubError::DeviceOperation(AndroidError::Other(format!(
                    "emulator {} did not boot within {}s",
                    device.record.id,
                    settings.emulator_start_timeout.as_secs()
                ))))
            }
        }
    }

    /// Instrumentation-server APK for `app`, built on first use and cached by
    /// app id for every later session.
    async fn instrumentation_server_for(&self, app: &AndroidApp) -> Result<AndroidApp, HubError> {
        if let Some(apk) = self.server_apks.lock().get(&app.app_id) {
            return Ok(apk.clone());
        }

        let built = self.builder.build_instrumentation_server(app).await?;
        let mut cache = self.server_apks.lock();
        Ok(cache.entry(app.app_id.clone()).or_insert(built).clone())
    }

    /// Bounded readiness poll. A crash log showing up during the wait fails
    /// the attempt as an app crash rather than a timeout.
    async fn wait_for_server(&self, device: &AllocatedDevice, port: u16) -> Result<(), HubError> {
        let settings = self.settings();
        let deadline = Instant::now() + settings.server_start_timeout;
        info!("waiting for the instrumentation server on port {port}");

        loop {
            if device.handle.is_instrumentation_server_running().await {
                info!("instrumentation server has started");
                return Ok(());
            }

            let crash = device.handle.crash_log().await;
            if !crash.is_empty() {
                return Err(HubError::AppCrashed(crash));
            }

            if Instant::now() >= deadline {
                return Err(HubError::DeviceOperation(AndroidError::Other(format!(
                    "instrumentation server did not come up within {}s",
                    settings.server_start_timeout.as_secs()
                ))));
            }
            sleep(settings.server_poll_interval).await;
        }
    }

    async fn negotiate_wd_session(
        &self,
        host: &str,
        port: u16,
        desired: &Capabilities,
    ) -> Result<(String, Capabilities), HubError> {
        let url = format!("http://{host}:{port}/wd/hub/session");
        let body = json!({ "desiredCapabilities": desired.as_json() });

        let response = self
            .http()
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                HubError::SessionCreation(format!("could not reach the device server: {err}"))
            })?;
        let envelope: Value = response.json().await.map_err(|err| {
            HubError::SessionCreation(format!("malformed reply from the device server: {err}"))
        })?;

        let status = envelope["status"].as_u64().unwrap_or_else(|| {
            u64::from(StatusCode::UnknownError.code())
        });
        if status != u64::from(StatusCode::Success.code()) {
            return Err(HubError::SessionCreation(format!(
                "device server refused the session (status {status}): {}",
                envelope["value"]
            )));
        }

        let session_id = envelope["sessionId"]
            .as_str()
            .ok_or_else(|| {
                HubError::SessionCreation("device server returned no session id".to_owned())
            })?
            .to_owned();

        let negotiated = envelope
            .get("value")
            .and_then(Value::as_object)
            .map(|caps| Capabilities::from_map(caps.clone()))
            .unwrap_or_else(|| desired.clone());

        Ok((session_id, negotiated))
    }

    /// Switch a webview-browser session into the webview context: wait for the
    /// webview widget, switch the window, then wait for the marker element.
    async fn switch_to_webview(&self, session: &ActiveSession) -> Result<(), HubError> {
        let deadline = Instant::now() + self.settings().webview_switch_timeout;

        self.wait_for_element(session, FindStrategy::ClassName, WEBVIEW_CLASS, deadline)
            .await?;

        let url = session.server_url(&format!(
            "/wd/hub/session/{}/window",
            session.session_id()
        ));
        let reply: Value = self
            .http()
            .post(&url)
            .json(&json!({ "name": "WEBVIEW" }))
            .send()
            .await
            .map_err(|err| HubError::SessionCreation(format!("window switch failed: {err}")))?
            .json()
            .await
            .map_err(|err| HubError::SessionCreation(format!("window switch failed: {err}")))?;
        if reply["status"].as_u64() != Some(0) {
            return Err(HubError::SessionCreation(format!(
                "window switch refused: {}",
                reply["value"]
            )));
        }

        self.wait_for_element(session, FindStrategy::Id, WEBVIEW_MARKER_ID, deadline)
            .await
    }

    async fn wait_for_element(
        &self,
        session: &ActiveSession,
        strategy: FindStrategy,
        value: &str,
        deadline: Instant,
    ) -> Result<(), HubError> {
        let url = session.server_url(&format!(
            "/wd/hub/session/{}/element",
            session.session_id()
        ));
        let locator = strategy.locator(value);

        loop {
            let found = self
                .http()
                .post(&url)
                .json(&locator)
                .send()
                .await;
            if let Ok(response) = found {
                if let Ok(reply) = response.json::<Value>().await {
                    if reply["status"].as_u64() == Some(0) {
                        return Ok(());
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(HubError::SessionCreation(format!(
                    "element {value} did not appear within the webview switch timeout"
                )));
            }
            sleep(WEBVIEW_POLL_INTERVAL).await;
        }
    }

    fn next_server_port(&self) -> u16 {
        self.ports.next()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
