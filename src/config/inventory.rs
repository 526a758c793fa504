use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::android::{AndroidApp, DeviceRecord};

// -----------------------------------------------------------------------------
// ----- Inventory -------------------------------------------------------------

/// The on-disk inventory: apps this hub can serve and devices it may lease.
#[derive(Debug, Clone, Deserialize)]
pub struct Inventory {
    pub hub: HubEntry,

    #[serde(default)]
    pub apps: Vec<AppEntry>,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubEntry {
    /// Prebuilt instrumentation-server APK installed next to every app under
    /// test.
    pub instrumentation_apk: PathBuf,

    pub emulator_options: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppEntry {
    pub app_id: String,
    pub base_package: String,
    pub main_activity: String,
    pub apk: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    /// Serial for hardware, AVD name for emulators.
    pub id: String,
    pub platform: String,
    pub screen_size: String,
    #[serde(default)]
    pub emulator: bool,
}

// -----------------------------------------------------------------------------
// ----- Inventory: Static -----------------------------------------------------

impl Inventory {
    pub async fn load(path: &Path) -> Result<Inventory, InventoryError> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|source| InventoryError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Inventory, InventoryError> {
        let inventory: Inventory =
            toml::from_str(raw).map_err(|source| InventoryError::Toml { source })?;

        let mut app_ids = HashSet::new();
        for app in &inventory.apps {
            if !app_ids.insert(app.app_id.as_str()) {
                return Err(InventoryError::DuplicateApp {
                    app_id: app.app_id.clone(),
                });
            }
        }

        let mut device_ids = HashSet::new();
        for device in &inventory.devices {
            if !device_ids.insert(device.id.as_str()) {
                return Err(InventoryError::DuplicateDevice {
                    id: device.id.clone(),
                });
            }
        }

        Ok(inventory)
    }
}

// -----------------------------------------------------------------------------
// ----- Inventory: Public -----------------------------------------------------

impl AppEntry {
    pub fn to_app(&self) -> AndroidApp {
        AndroidApp {
            app_id: self.app_id.clone(),
            base_package: self.base_package.clone(),
            main_activity: self.main_activity.clone(),
            apk_path: self.apk.clone(),
        }
    }
}

impl DeviceEntry {
    pub fn to_record(&self) -> DeviceRecord {
        DeviceRecord {
            id: self.id.clone(),
            platform: self.platform.clone(),
            screen_size: self.screen_size.clone(),
            emulator: self.emulator,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("duplicate [[apps]] entry for app '{app_id}'")]
    DuplicateApp { app_id: String },

    #[error("duplicate [[devices]] entry for device '{id}'")]
    DuplicateDevice { id: String },

    #[error("read error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [hub]
        instrumentation_apk = "apks/droidhub-server.apk"
        emulator_options = "-no-audio -no-window"

        [[apps]]
        app_id = "io.selendroid.testapp:0.17.0"
        base_package = "io.selendroid.testapp"
        main_activity = ".HomeScreenActivity"
        apk = "apks/selendroid-test-app.apk"

        [[devices]]
        id = "test-avd-19"
        platform = "19"
        screen_size = "320x480"
        emulator = true
    "#;

    #[test]
    fn parses_full_inventory() {
        let inventory = Inventory::parse(SAMPLE).unwrap();
        assert_eq!(inventory.apps.len(), 1);
        assert_eq!(inventory.devices.len(), 1);
        let app = inventory.apps[0].to_app();
        assert_eq!(app.base_package, "io.selendroid.testapp");
        let device = inventory.devices[0].to_record();
        assert!(device.emulator);
    }

    #[test]
    fn rejects_duplicate_app_ids() {
        let doubled = format!(
            "{SAMPLE}\n[[apps]]\napp_id = \"io.selendroid.testapp:0.17.0\"\n\
             base_package = \"x\"\nmain_activity = \".X\"\napk = \"x.apk\"\n"
        );
        assert!(matches!(
            Inventory::parse(&doubled).unwrap_err(),
            InventoryError::DuplicateApp { .. }
        ));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
