use roster_core::resource::ApiBase;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HOST: &str = "localhost:5000";

/// API client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL for most resources, ending in `/api/`.
    pub main_base: String,
    /// Base URL for districts (`REACT_APP_DISTRICT_API_URL`).
    pub district_base: String,
    /// Base URL for local congregation lookups.
    pub local_congregation_base: String,
    pub timeout: Duration,
    /// Where the login session is persisted.
    pub session_path: PathBuf,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let https = lookup("HTTPS").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let main_host = lookup("REACT_APP_API_URL")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let secondary = |key: &str| {
            lookup(key)
                .filter(|h| !h.trim().is_empty())
                .map(|h| base_url(&h, https))
                .unwrap_or_else(|| base_url(&main_host, https))
        };

        let data_dir = lookup("ROSTER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(&lookup));

        Self {
            district_base: secondary("REACT_APP_DISTRICT_API_URL"),
            local_congregation_base: secondary("REACT_APP_LOCAL_CONGREGATION_API_URL"),
            main_base: base_url(&main_host, https),
            timeout: Duration::from_secs(
                lookup("ROSTER_HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            session_path: data_dir.join("session.toml"),
        }
    }

    /// Every base pointed at one server, as tests and local setups want.
    pub fn for_host(host: &str) -> Self {
        let base = base_url(host, false);
        Self {
            main_base: base.clone(),
            district_base: base.clone(),
            local_congregation_base: base,
            timeout: Duration::from_secs(30),
            session_path: default_data_dir(&|key: &str| std::env::var(key).ok()).join("session.toml"),
        }
    }

    pub fn base(&self, api: ApiBase) -> &str {
        match api {
            ApiBase::Main => &self.main_base,
            ApiBase::District => &self.district_base,
            ApiBase::LocalCongregation => &self.local_congregation_base,
        }
    }
}

/// `{protocol}://{host}/api/`. A host that already names its scheme keeps it.
pub fn base_url(host: &str, https: bool) -> String {
    let host = host.trim().trim_end_matches('/');
    let host = host.strip_suffix("/api").unwrap_or(host);
    if host.contains("://") {
        format!("{host}/api/")
    } else {
        let protocol = if https { "https" } else { "http" };
        format!("{protocol}://{host}/api/")
    }
}

fn default_data_dir(lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    lookup("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("roster")
}
