//! Application context: everything a command needs, built once in `main`.

use anyhow::Result;
use roster_client::{ApiClient, ApiConfig, AuthStore, Navigator, UnauthorizedGuard, LOGIN_ROUTE};
use roster_face::{ModelLoader, OnnxRuntime};
use roster_hw::{V4lDevice, VideoDevice};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

const DEFAULT_CAMERA: &str = "/dev/video0";

/// Tracks which "screen" the command is on and tells the user to log in
/// again when the server rejects the session.
pub struct TerminalNavigator {
    route: Mutex<String>,
}

impl TerminalNavigator {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: Mutex::new(route.into()),
        }
    }

    pub fn enter(&self, route: impl Into<String>) {
        *self.route.lock().unwrap_or_else(PoisonError::into_inner) = route.into();
    }
}

impl Navigator for TerminalNavigator {
    fn current_route(&self) -> String {
        self.route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn redirect(&self, route: &str) {
        self.enter(route);
        if route == LOGIN_ROUTE {
            eprintln!("Your session has expired. Run `roster login` to sign in again.");
        }
    }
}

pub struct AppContext {
    pub api: Arc<ApiClient>,
    pub navigator: Arc<TerminalNavigator>,
    pub model_dir: PathBuf,
    /// `None` selects a camera automatically.
    pub camera_device: Option<String>,
}

impl AppContext {
    /// Build from `REACT_APP_*` and `ROSTER_*` environment variables.
    pub fn from_env(route: &str) -> Result<Self> {
        let config = ApiConfig::from_env();
        let auth = Arc::new(AuthStore::open(&config.session_path));
        let navigator = Arc::new(TerminalNavigator::new(route));
        let guard = Arc::new(UnauthorizedGuard::new(navigator.clone()));
        let api = Arc::new(ApiClient::new(config, auth, guard)?);

        let model_dir = std::env::var("ROSTER_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| roster_face::default_model_dir());
        let camera_device = camera_from(std::env::var("ROSTER_CAMERA_DEVICE").ok());

        Ok(Self {
            api,
            navigator,
            model_dir,
            camera_device,
        })
    }

    pub fn device(&self) -> Arc<dyn VideoDevice> {
        match &self.camera_device {
            Some(path) => Arc::new(V4lDevice::new(path.clone())),
            None => Arc::new(V4lDevice::auto()),
        }
    }

    pub fn loader(&self) -> ModelLoader<OnnxRuntime> {
        ModelLoader::onnx(self.model_dir.clone())
    }
}

fn camera_from(setting: Option<String>) -> Option<String> {
    match setting.as_deref().map(str::trim) {
        None | Some("") => Some(DEFAULT_CAMERA.to_string()),
        Some("auto") => None,
        Some(path) => Some(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_setting() {
        assert_eq!(camera_from(None).as_deref(), Some("/dev/video0"));
        assert_eq!(camera_from(Some("auto".into())), None);
        assert_eq!(camera_from(Some("/dev/video2".into())).as_deref(), Some("/dev/video2"));
    }

    #[test]
    fn test_navigator_records_redirect() {
        let nav = TerminalNavigator::new("/groups");
        nav.redirect(LOGIN_ROUTE);
        assert_eq!(nav.current_route(), LOGIN_ROUTE);
    }
}
