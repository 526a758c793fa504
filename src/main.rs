use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use droidhub::android::adb::AdbDevice;
use droidhub::android::{AndroidApp, AppBuilder, AppStore, PrebuiltBuilder};
use droidhub::config::{CliConfig, HubSettings, Inventory};
use droidhub::pool::DeviceStore;
use droidhub::{Hub, server};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "🤖 droidhub";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let (hub, listen_addr) = setup().await;
    run_forever(hub, listen_addr).await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() -> (Arc<Hub>, SocketAddr) {
    let cli = CliConfig::load();
    init_tracing(&cli);

    let inventory = Inventory::load(&cli.inventory_file)
        .await
        .unwrap_or_else(|e| {
            panic!(
                "failed to load inventory {}: {e}",
                cli.inventory_file.display()
            )
        });
    let settings = HubSettings::from_cli(&cli, &inventory);

    let declared: Vec<AndroidApp> = inventory.apps.iter().map(|entry| entry.to_app()).collect();
    let builder = Arc::new(PrebuiltBuilder::new(
        declared.clone(),
        inventory.hub.instrumentation_apk.clone(),
    ));

    let mut apps = AppStore::new();
    for app in &declared {
        match builder.resign(&app.apk_path).await {
            Ok(app) => apps.register(app),
            Err(err) => error!("ignoring app {}: {err}", app.app_id),
        }
    }

    let devices = DeviceStore::new(settings.emulator_port_base, settings.emulator_port_max());
    for entry in &inventory.devices {
        let record = entry.to_record();
        let handle = AdbDevice::new(record.clone(), cli.adb.clone(), cli.emulator.clone());
        devices.register(record, Arc::new(handle));
    }
    if inventory.devices.is_empty() {
        warn!(
            "no devices declared in the inventory; create emulators or plug in \
             a hardware device and add them to {}",
            cli.inventory_file.display()
        );
    }

    let hub = Arc::new(Hub::new(settings, apps, devices, builder));
    (hub, cli.listen_addr)
}

fn init_tracing(cli: &CliConfig) {
    let filter = EnvFilter::try_new(cli.log_level.as_str()).unwrap();
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever(hub: Arc<Hub>, listen_addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("{APP_NAME} listening on {listen_addr}");

    server::serve(hub.clone(), listener, shutdown_signal()).await?;

    info!("{APP_NAME} shutting down");
    hub.quit().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
