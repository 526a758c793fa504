use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::android::{AndroidApp, DeviceHandle, DeviceRecord};
use crate::wire::Capabilities;

pub mod registry;

pub use registry::SessionRegistry;

// -----------------------------------------------------------------------------
// ----- ActiveSession ---------------------------------------------------------

/// One running test session: the binding of a client-visible session id to an
/// allocated device running the app under test behind an instrumentation
/// server.
pub struct ActiveSession {
    session_id: String,
    capabilities: Capabilities,
    app: AndroidApp,
    device: DeviceRecord,
    handle: Arc<dyn DeviceHandle>,
    host: String,
    port: u16,
    created_at: SystemTime,
    /// Set when the underlying device became unreachable. Invalid sessions
    /// stay registered so later commands fail fast without device I/O.
    invalid: AtomicBool,
    timeout_task: Mutex<Option<AbortHandle>>,
}

impl ActiveSession {
    pub fn new(
        session_id: String,
        capabilities: Capabilities,
        app: AndroidApp,
        device: DeviceRecord,
        handle: Arc<dyn DeviceHandle>,
        host: String,
        port: u16,
    ) -> Self {
        Self {
            session_id,
            capabilities,
            app,
            device,
            handle,
            host,
            port,
            created_at: SystemTime::now(),
            invalid: AtomicBool::new(false),
            timeout_task: Mutex::new(None),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ActiveSession: Public -------------------------------------------------

impl ActiveSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn app(&self) -> &AndroidApp {
        &self.app
    }

    pub fn device(&self) -> &DeviceRecord {
        &self.device
    }

    pub fn handle(&self) -> &Arc<dyn DeviceHandle> {
        &self.handle
    }

    pub fn server_port(&self) -> u16 {
        self.port
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Absolute URL on this session's device server for `path` (which must
    /// start with '/').
    pub fn server_url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.invalid.store(true, Ordering::Release);
    }

    /// Attach the session-timeout task, replacing (and aborting) any previous
    /// one.
    pub fn arm_timeout(&self, handle: AbortHandle) {
        if let Some(previous) = self.timeout_task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel_timeout(&self) {
        if let Some(task) = self.timeout_task.lock().take() {
            task.abort();
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
