use std::collections::HashMap;
use std::path::PathBuf;

use tracing::info;

// -----------------------------------------------------------------------------
// ----- AndroidApp ------------------------------------------------------------

/// An application under test, immutable once registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AndroidApp {
    pub app_id: String,
    pub base_package: String,
    pub main_activity: String,
    pub apk_path: PathBuf,
}

impl AndroidApp {
    /// Clients may override the launch activity per session; the registered
    /// app stays untouched.
    pub fn with_main_activity(&self, activity: &str) -> Self {
        Self {
            main_activity: activity.to_owned(),
            ..self.clone()
        }
    }
}

// -----------------------------------------------------------------------------
// ----- AppStore --------------------------------------------------------------

/// The apps this hub can serve, keyed by app id. Filled once at startup and
/// read-only afterwards.
#[derive(Debug, Default)]
pub struct AppStore {
    apps: HashMap<String, AndroidApp>,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an app. A duplicate id keeps the first registration.
    pub fn register(&mut self, app: AndroidApp) {
        if self.apps.contains_key(&app.app_id) {
            return;
        }
        info!("app {} added to the hub", app.app_id);
        self.apps.insert(app.app_id.clone(), app);
    }

    pub fn resolve(&self, app_id: &str) -> Option<&AndroidApp> {
        self.apps.get(app_id)
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// All registered apps, sorted by id for stable listings.
    pub fn all(&self) -> Vec<&AndroidApp> {
        let mut apps: Vec<&AndroidApp> = self.apps.values().collect();
        apps.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        apps
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str) -> AndroidApp {
        AndroidApp {
            app_id: id.to_owned(),
            base_package: "io.example.app".to_owned(),
            main_activity: ".MainActivity".to_owned(),
            apk_path: PathBuf::from("/tmp/app.apk"),
        }
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let mut store = AppStore::new();
        store.register(app("a:1.0"));
        let mut second = app("a:1.0");
        second.main_activity = ".Other".to_owned();
        store.register(second);
        assert_eq!(store.resolve("a:1.0").unwrap().main_activity, ".MainActivity");
    }

    #[test]
    fn main_activity_override_does_not_mutate() {
        let original = app("a:1.0");
        let adjusted = original.with_main_activity(".Custom");
        assert_eq!(adjusted.main_activity, ".Custom");
        assert_eq!(original.main_activity, ".MainActivity");
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
