use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use droidhub::android::{
    AndroidApp, AndroidError, AppBuilder, AppStore, DeviceHandle, DeviceRecord, EmulatorLaunch,
};
use droidhub::config::HubSettings;
use droidhub::pool::DeviceStore;
use droidhub::{Hub, server};

// -----------------------------------------------------------------------------
// ----- Settings and fixtures -------------------------------------------------

/// Hub settings tuned for fast tests. Each test file uses its own forward-port
/// base so stub servers never collide across parallel tests.
#[allow(dead_code)]
pub fn test_settings(port_base: u16) -> HubSettings {
    HubSettings {
        emulator_hostname: "127.0.0.1".to_owned(),
        server_port_base: port_base,
        server_start_timeout: Duration::from_secs(2),
        server_poll_interval: Duration::from_millis(50),
        webview_switch_timeout: Duration::from_secs(3),
        ..HubSettings::default()
    }
}

#[allow(dead_code)]
pub fn testapp() -> AndroidApp {
    AndroidApp {
        app_id: "io.selendroid.testapp".to_owned(),
        base_package: "io.selendroid.testapp".to_owned(),
        main_activity: ".HomeScreenActivity".to_owned(),
        apk_path: PathBuf::from("/apks/selendroid-test-app.apk"),
    }
}

#[allow(dead_code)]
pub fn webview_app() -> AndroidApp {
    AndroidApp {
        app_id: "android".to_owned(),
        base_package: "io.droidhub.webviewapp".to_owned(),
        main_activity: ".WebViewActivity".to_owned(),
        apk_path: PathBuf::from("/apks/webview-app.apk"),
    }
}

#[allow(dead_code)]
pub fn emulator_record(id: &str) -> DeviceRecord {
    DeviceRecord {
        id: id.to_owned(),
        platform: "19".to_owned(),
        screen_size: "320x480".to_owned(),
        emulator: true,
    }
}

#[allow(dead_code)]
pub fn session_caps(aut: &str) -> Value {
    json!({ "desiredCapabilities": { "aut": aut, "platformVersion": "19" } })
}

// -----------------------------------------------------------------------------
// ----- FakeWdServer ----------------------------------------------------------

/// Behavior knobs and observations of the stub device server, shared with the
/// test body.
#[derive(Default)]
pub struct StubState {
    /// Drop this many incoming connections before answering again; each drop
    /// is one transport-level failure for the proxy.
    pub drop_connections: AtomicUsize,
    /// Whether element lookups succeed.
    pub element_found: AtomicBool,
    /// Every request that produced a response: (method, target).
    pub requests: Mutex<Vec<(String, String)>>,
    pub session_counter: AtomicUsize,
}

impl StubState {
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        state.element_found.store(true, Ordering::SeqCst);
        Arc::new(state)
    }

    fn respond(&self, method: &str, target: &str, body: &[u8]) -> (u16, String) {
        self.requests
            .lock()
            .push((method.to_owned(), target.to_owned()));
        let path = target.split('?').next().unwrap_or(target);

        if path.ends_with("/unknown") {
            return (404, "{}".to_owned());
        }
        if method == "POST" && path == "/wd/hub/session" {
            let n = self.session_counter.fetch_add(1, Ordering::SeqCst);
            let caps = serde_json::from_slice::<Value>(body)
                .ok()
                .and_then(|payload| payload.get("desiredCapabilities").cloned())
                .unwrap_or(Value::Null);
            let envelope = json!({
                "sessionId": format!("stub-session-{n}"),
                "status": 0,
                "value": caps,
            });
            return (200, envelope.to_string());
        }
        if method == "POST" && path.ends_with("/element") {
            let envelope = if self.element_found.load(Ordering::SeqCst) {
                json!({ "status": 0, "value": { "ELEMENT": "42" } })
            } else {
                json!({ "status": 7, "value": { "message": "element not found" } })
            };
            return (200, envelope.to_string());
        }
        if method == "POST" && path.ends_with("/window") {
            return (200, json!({ "status": 0 }).to_string());
        }
        if method == "GET" && path.ends_with("/title") {
            return (200, json!({ "status": 0, "value": "Fake Title" }).to_string());
        }
        if path.ends_with("/no-such-element") {
            let envelope = json!({ "status": 7, "value": { "message": "could not locate" } });
            return (200, envelope.to_string());
        }

        (200, json!({ "status": 0, "value": Value::Null }).to_string())
    }
}

/// A minimal WebDriver-speaking HTTP stub bound to the exact port the hub
/// assigned. Raw TCP so tests can simulate transport failures by dropping
/// whole connections.
pub struct FakeWdServer;

impl FakeWdServer {
    pub async fn spawn(port: u16, state: Arc<StubState>) -> std::io::Result<()> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                if state.drop_connections.load(Ordering::SeqCst) > 0 {
                    state.drop_connections.fetch_sub(1, Ordering::SeqCst);
                    drop(stream);
                    continue;
                }
                let state = state.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, state).await;
                });
            }
        });
        Ok(())
    }
}

async fn serve_connection(mut stream: TcpStream, state: Arc<StubState>) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    let head_end = loop {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let target = parts.next().unwrap_or_default().to_owned();

    let content_length = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .next()
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let (code, payload) = state.respond(&method, &target, &body);
    let reason = if code == 200 { "OK" } else { "Not Found" };
    let response = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

// -----------------------------------------------------------------------------
// ----- FakeDevice ------------------------------------------------------------

pub struct FakeDeviceState {
    /// Device online: consulted both by emulator boot and by the proxy's
    /// reachability probe.
    pub ready: AtomicBool,
    /// Remaining boot attempts that should fail before one succeeds.
    pub boot_failures: AtomicUsize,
    pub installed: Mutex<HashSet<String>>,
    pub server_running: AtomicBool,
    pub crash_log: Mutex<String>,
    pub shell_commands: Mutex<Vec<String>>,
    /// The stub device server's shared state.
    pub stub: Arc<StubState>,
}

pub struct FakeDevice {
    state: Arc<FakeDeviceState>,
}

impl FakeDevice {
    /// A powered-off emulator that boots successfully on demand.
    #[allow(dead_code)]
    pub fn emulator() -> Self {
        Self::with_ready(false)
    }

    /// A device that is already online (hardware, or a booted emulator).
    #[allow(dead_code)]
    pub fn online() -> Self {
        Self::with_ready(true)
    }

    fn with_ready(ready: bool) -> Self {
        Self {
            state: Arc::new(FakeDeviceState {
                ready: AtomicBool::new(ready),
                boot_failures: AtomicUsize::new(0),
                installed: Mutex::new(HashSet::new()),
                server_running: AtomicBool::new(false),
                crash_log: Mutex::new(String::new()),
                shell_commands: Mutex::new(Vec::new()),
                stub: StubState::new(),
            }),
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> Arc<FakeDeviceState> {
        self.state.clone()
    }
}

#[async_trait]
impl DeviceHandle for FakeDevice {
    async fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::SeqCst)
    }

    async fn install(&self, app: &AndroidApp) -> Result<(), AndroidError> {
        self.state.installed.lock().insert(app.base_package.clone());
        Ok(())
    }

    async fn is_installed(&self, app: &AndroidApp) -> Result<bool, AndroidError> {
        Ok(self.state.installed.lock().contains(&app.base_package))
    }

    async fn start(&self, _launch: &EmulatorLaunch) -> Result<(), AndroidError> {
        if self.state.boot_failures.load(Ordering::SeqCst) > 0 {
            self.state.boot_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(AndroidError::Other("emulator refused to boot".to_owned()));
        }
        self.state.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn start_instrumentation_server(
        &self,
        _app: &AndroidApp,
        port: u16,
    ) -> Result<(), AndroidError> {
        FakeWdServer::spawn(port, self.state.stub.clone())
            .await
            .map_err(|source| AndroidError::Io {
                device: "fake".to_owned(),
                source,
            })?;
        self.state.server_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_instrumentation_server_running(&self) -> bool {
        self.state.server_running.load(Ordering::SeqCst)
    }

    async fn crash_log(&self) -> String {
        self.state.crash_log.lock().clone()
    }

    async fn run_shell_command(&self, command: &str) -> Result<String, AndroidError> {
        self.state.shell_commands.lock().push(command.to_owned());
        Ok(String::new())
    }

    async fn forward_port(&self, _local: u16, _remote: u16) -> Result<(), AndroidError> {
        Ok(())
    }

    async fn list_third_party_processes(&self) -> String {
        "package:com.example.one\npackage:com.example.two".to_owned()
    }

    async fn take_screenshot(&self) -> Result<Vec<u8>, AndroidError> {
        Ok(b"PNG".to_vec())
    }
}

// -----------------------------------------------------------------------------
// ----- FakeBuilder -----------------------------------------------------------

#[derive(Default)]
pub struct FakeBuilder {
    pub server_builds: AtomicUsize,
}

#[async_trait]
impl AppBuilder for FakeBuilder {
    async fn resign(&self, apk: &std::path::Path) -> Result<AndroidApp, AndroidError> {
        let stem = apk
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("app")
            .to_owned();
        Ok(AndroidApp {
            app_id: stem.clone(),
            base_package: stem,
            main_activity: ".MainActivity".to_owned(),
            apk_path: apk.to_path_buf(),
        })
    }

    async fn build_instrumentation_server(
        &self,
        app: &AndroidApp,
    ) -> Result<AndroidApp, AndroidError> {
        self.server_builds.fetch_add(1, Ordering::SeqCst);
        Ok(AndroidApp {
            app_id: format!("io.droidhub.server:{}", app.base_package),
            base_package: format!("io.droidhub.{}", app.base_package),
            main_activity: "io.droidhub.server.ServerActivity".to_owned(),
            apk_path: PathBuf::from("/apks/droidhub-server.apk"),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Hub construction ------------------------------------------------------

#[allow(dead_code)]
pub fn make_hub(
    settings: HubSettings,
    apps: Vec<AndroidApp>,
    devices: Vec<(DeviceRecord, Arc<FakeDevice>)>,
) -> Arc<Hub> {
    make_hub_with_builder(settings, apps, devices, Arc::new(FakeBuilder::default()))
}

#[allow(dead_code)]
pub fn make_hub_with_builder(
    settings: HubSettings,
    apps: Vec<AndroidApp>,
    devices: Vec<(DeviceRecord, Arc<FakeDevice>)>,
    builder: Arc<FakeBuilder>,
) -> Arc<Hub> {
    let mut app_store = AppStore::new();
    for app in apps {
        app_store.register(app);
    }

    let device_store = DeviceStore::new(
        settings.emulator_port_base,
        settings.emulator_port_max(),
    );
    for (record, handle) in devices {
        device_store.register(record, handle);
    }

    Arc::new(Hub::new(settings, app_store, device_store, builder))
}

// -----------------------------------------------------------------------------
// ----- In-process server -----------------------------------------------------

#[allow(dead_code)]
pub struct TestHub {
    pub hub: Arc<Hub>,
    pub addr: SocketAddr,
    pub client: reqwest::Client,
}

impl TestHub {
    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// Serve the hub on an ephemeral port for the lifetime of the test process.
#[allow(dead_code)]
pub async fn spawn_hub(hub: Arc<Hub>) -> TestHub {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(server::serve(hub.clone(), listener, std::future::pending()));

    TestHub {
        hub,
        addr,
        client: reqwest::Client::new(),
    }
}

/// POST a new-session request over HTTP and return the parsed envelope.
#[allow(dead_code)]
pub async fn http_create_session(t: &TestHub, aut: &str) -> Value {
    let response = t
        .client
        .post(t.url("/wd/hub/session"))
        .json(&session_caps(aut))
        .send()
        .await
        .expect("create-session request");
    response.json().await.expect("create-session envelope")
}
