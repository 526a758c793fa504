use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::app::AndroidApp;
use super::device::AndroidError;

/// Package prefix of instrumentation-server builds, one per app under test.
pub const SERVER_PACKAGE_PREFIX: &str = "io.droidhub";

// -----------------------------------------------------------------------------
// ----- AppBuilder ------------------------------------------------------------

/// Produces installable APKs: resigned apps under test and the per-app
/// instrumentation server. Signing and APK assembly are platform tooling, so
/// they stay behind this seam.
#[async_trait]
pub trait AppBuilder: Send + Sync {
    /// Resign the APK at `apk` with the hub's debug key and describe it.
    async fn resign(&self, apk: &Path) -> Result<AndroidApp, AndroidError>;

    /// Build the instrumentation server APK targeting `app`'s package. Called
    /// at most once per app id; the hub caches the result.
    async fn build_instrumentation_server(
        &self,
        app: &AndroidApp,
    ) -> Result<AndroidApp, AndroidError>;
}

/// The package name the instrumentation server uses when built against `app`.
pub fn server_package_for(app: &AndroidApp) -> String {
    format!("{SERVER_PACKAGE_PREFIX}.{}", app.base_package)
}

// -----------------------------------------------------------------------------
// ----- PrebuiltBuilder -------------------------------------------------------

/// An `AppBuilder` for deployments where APKs are signed ahead of time: the
/// inventory file declares each app's metadata and one prebuilt
/// instrumentation-server APK that targets any of them.
#[derive(Debug)]
pub struct PrebuiltBuilder {
    by_path: HashMap<PathBuf, AndroidApp>,
    server_apk: PathBuf,
}

impl PrebuiltBuilder {
    pub fn new(declared: Vec<AndroidApp>, server_apk: PathBuf) -> Self {
        let by_path = declared
            .into_iter()
            .map(|app| (app.apk_path.clone(), app))
            .collect();
        Self {
            by_path,
            server_apk,
        }
    }
}

#[async_trait]
impl AppBuilder for PrebuiltBuilder {
    async fn resign(&self, apk: &Path) -> Result<AndroidApp, AndroidError> {
        self.by_path.get(apk).cloned().ok_or_else(|| {
            AndroidError::Other(format!("no inventory entry for APK {}", apk.display()))
        })
    }

    async fn build_instrumentation_server(
        &self,
        app: &AndroidApp,
    ) -> Result<AndroidApp, AndroidError> {
        Ok(AndroidApp {
            app_id: format!("{SERVER_PACKAGE_PREFIX}.server:{}", app.base_package),
            base_package: server_package_for(app),
            main_activity: format!("{SERVER_PACKAGE_PREFIX}.server.ServerActivity"),
            apk_path: self.server_apk.clone(),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
