use crate::poller::FeedStats;
use roster_client::AuthStore;
use std::sync::Arc;
use tokio::sync::Notify;
use zbus::interface;

pub const BUS_NAME: &str = "org.roster.Notifier1";
pub const OBJECT_PATH: &str = "/org/roster/Notifier1";

/// D-Bus interface for the notifier daemon.
///
/// Bus name: org.roster.Notifier1
/// Object path: /org/roster/Notifier1
pub struct NotifierService {
    pub auth: Arc<AuthStore>,
    pub reminders: Arc<FeedStats>,
    pub assignments: Arc<FeedStats>,
    pub refresh: Vec<Arc<Notify>>,
}

impl NotifierService {
    /// Wake every poller now instead of at its next tick.
    pub fn request_refresh(&self) {
        for notify in &self.refresh {
            notify.notify_one();
        }
    }

    pub fn status_json(&self) -> String {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "logged_in": self.auth.is_logged_in(),
            "user": self.auth.current().and_then(|s| s.display_name),
            "reminders": self.reminders.snapshot(),
            "assignments": self.assignments.snapshot(),
        })
        .to_string()
    }
}

#[interface(name = "org.roster.Notifier1")]
impl NotifierService {
    /// Poll both feeds immediately.
    async fn refresh(&self) -> zbus::fdo::Result<()> {
        tracing::info!("refresh requested");
        self.request_refresh();
        Ok(())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.status_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_client::AuthSession;

    #[tokio::test]
    async fn test_refresh_wakes_every_feed() {
        let feeds = [Arc::new(Notify::new()), Arc::new(Notify::new())];
        let service = NotifierService {
            auth: Arc::new(AuthStore::in_memory(None)),
            reminders: Arc::default(),
            assignments: Arc::default(),
            refresh: feeds.to_vec(),
        };
        service.request_refresh();
        for notify in feeds {
            tokio::time::timeout(std::time::Duration::from_millis(100), notify.notified())
                .await
                .expect("permit stored");
        }
    }

    #[test]
    fn test_status_json_shape() {
        let session = AuthSession::new("t").with_user(&serde_json::json!({ "username": "admin" }));
        let service = NotifierService {
            auth: Arc::new(AuthStore::in_memory(Some(session))),
            reminders: Arc::default(),
            assignments: Arc::default(),
            refresh: Vec::new(),
        };
        let status: serde_json::Value = serde_json::from_str(&service.status_json()).unwrap();
        assert_eq!(status["logged_in"], true);
        assert_eq!(status["user"], "admin");
        assert_eq!(status["reminders"]["polls"], 0);
        assert!(status["assignments"]["last_error"].is_null());
    }
}
