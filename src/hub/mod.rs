use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::android::{AndroidApp, AppBuilder, AppStore};
use crate::config::HubSettings;
use crate::pool::{DeviceStore, PortCounter};
use crate::session::{ActiveSession, SessionRegistry};

pub mod pipeline;

// -----------------------------------------------------------------------------
// ----- Hub -------------------------------------------------------------------

/// The orchestration core: one explicit object owning the app store, device
/// pool, session registry and port counter. Constructed once at startup (or
/// per test) and shared as `Arc<Hub>`; there are no process-wide singletons.
pub struct Hub {
    settings: HubSettings,
    apps: AppStore,
    devices: DeviceStore,
    sessions: SessionRegistry,
    ports: PortCounter,
    /// Instrumentation-server APKs, built once per app id and reused across
    /// sessions.
    server_apks: Mutex<HashMap<String, AndroidApp>>,
    builder: Arc<dyn AppBuilder>,
    http: reqwest::Client,
}

// -----------------------------------------------------------------------------
// ----- Hub: Static -----------------------------------------------------------

impl Hub {
    pub fn new(
        settings: HubSettings,
        apps: AppStore,
        devices: DeviceStore,
        builder: Arc<dyn AppBuilder>,
    ) -> Self {
        if apps.is_empty() {
            warn!("no apps registered; every session request will be refused");
        }
        let ports = PortCounter::new(settings.server_port_base);
        Self {
            settings,
            apps,
            devices,
            sessions: SessionRegistry::new(),
            ports,
            server_apks: Mutex::new(HashMap::new()),
            builder,
            http: reqwest::Client::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Hub: Accessors --------------------------------------------------------

impl Hub {
    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn apps(&self) -> &AppStore {
        &self.apps
    }

    pub fn devices(&self) -> &DeviceStore {
        &self.devices
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

// -----------------------------------------------------------------------------
// ----- Hub: Session management -----------------------------------------------

impl Hub {
    /// Stop a session: cancel its timeout, tear down the device-side session
    /// (best effort), stop the app and hand the device back to the pool.
    /// Returns false when no such session exists.
    pub async fn stop_session(&self, session_id: &str) -> bool {
        let Some(session) = self.sessions.remove(session_id) else {
            return false;
        };
        session.cancel_timeout();

        let url = session.server_url(&format!("/wd/hub/session/{session_id}"));
        if let Err(err) = self.http.delete(&url).send().await {
            warn!("error stopping device-side session, safe to ignore: {err}");
        }

        // Stop the app under test so a later session starts clean.
        let force_stop = format!("shell am force-stop {}", session.app().base_package);
        if let Err(err) = session.handle().run_shell_command(&force_stop).await {
            warn!("failed to stop app when releasing device: {err}");
        }

        self.devices.release(&session.device().id);
        info!("session {session_id} stopped");
        true
    }

    /// Stop every active session. Used on server shutdown.
    pub async fn quit(&self) {
        for session_id in self.sessions.ids() {
            self.stop_session(&session_id).await;
        }
    }

    pub fn session_capabilities(&self, session_id: &str) -> Option<Value> {
        self.sessions
            .get(session_id)
            .map(|session| session.capabilities().as_json())
    }

    /// Mark a session invalid after its device became unreachable. The session
    /// stays registered; commands against it fail fast without device I/O.
    pub fn invalidate_session(&self, session_id: &str) {
        if let Some(session) = self.sessions.get(session_id) {
            warn!("marking session {session_id} invalid; its device is unreachable");
            session.invalidate();
        }
    }

    pub(crate) fn arm_session_timeout(self: &Arc<Self>, session: &Arc<ActiveSession>) {
        let timeout = self.settings.session_timeout;
        if timeout.is_zero() {
            return;
        }
        let hub = Arc::downgrade(self);
        let session_id = session.session_id().to_owned();
        let task = tokio::spawn(async move {
            sleep(timeout).await;
            if let Some(hub) = hub.upgrade() {
                info!("stopping session {session_id} after the configured session timeout");
                hub.stop_session(&session_id).await;
            }
        });
        session.arm_timeout(task.abort_handle());
    }
}

// -----------------------------------------------------------------------------
// ----- Hub: Status inventory -------------------------------------------------

impl Hub {
    pub fn supported_apps(&self) -> Value {
        let apps: Vec<Value> = self
            .apps
            .all()
            .into_iter()
            .map(|app| {
                json!({
                    "appId": app.app_id,
                    "basePackage": app.base_package,
                    "mainActivity": app.main_activity,
                })
            })
            .collect();
        Value::Array(apps)
    }

    pub fn supported_devices(&self) -> Value {
        let devices: Vec<Value> = self
            .devices
            .snapshot()
            .into_iter()
            .map(|device| {
                let mut info = serde_json::Map::new();
                info.insert("emulator".to_owned(), json!(device.record.emulator));
                let id_key = if device.record.emulator { "avdName" } else { "serial" };
                info.insert(id_key.to_owned(), json!(device.record.id));
                info.insert("platformVersion".to_owned(), json!(device.record.platform));
                info.insert("screenSize".to_owned(), json!(device.record.screen_size));
                info.insert("inUse".to_owned(), json!(device.in_use));
                Value::Object(info)
            })
            .collect();
        Value::Array(devices)
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
