//! Local alert side effects: audio cue, spoken text, toast.
//!
//! Every step is best-effort. A missing player, a dead speech engine or an
//! absent notification server is logged and skipped, never propagated.

use crate::config::Config;
use roster_core::Alert;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use tokio::process::{Child, Command};

/// Where alerts go.
pub trait AlertSink: Send + Sync + 'static {
    fn raise(&self, alert: &Alert) -> impl Future<Output = ()> + Send;
}

#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, zbus::zvariant::Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

/// Single shared speech engine. A new utterance kills the one still talking.
pub struct Speaker {
    command: Option<String>,
    current: Mutex<Option<Child>>,
}

impl Speaker {
    pub fn new(command: Option<String>) -> Self {
        Self {
            command,
            current: Mutex::new(None),
        }
    }

    pub fn speak(&self, text: &str) {
        let Some(command) = &self.command else {
            return;
        };
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut prior) = current.take() {
            if let Err(e) = prior.start_kill() {
                tracing::debug!(error = %e, "previous utterance already finished");
            }
        }
        match quiet(command).arg(text).spawn() {
            Ok(child) => *current = Some(child),
            Err(e) => tracing::debug!(command, error = %e, "speech unavailable"),
        }
    }
}

/// Sound, speech and a desktop toast (or a terminal line when no
/// notification server is reachable).
pub struct DesktopAlerter {
    sound: Option<PathBuf>,
    player: String,
    speaker: Speaker,
    notifications: Option<NotificationsProxy<'static>>,
}

impl DesktopAlerter {
    pub async fn connect(config: &Config) -> Self {
        let notifications = if config.desktop_notify {
            match notifications_proxy().await {
                Ok(proxy) => Some(proxy),
                Err(e) => {
                    tracing::warn!(error = %e, "desktop notifications unavailable; printing alerts");
                    None
                }
            }
        } else {
            None
        };
        Self {
            sound: config.alert_sound.clone(),
            player: config.sound_player.clone(),
            speaker: Speaker::new(config.speech_cmd.clone()),
            notifications,
        }
    }

    fn play_sound(&self) {
        let Some(sound) = &self.sound else {
            return;
        };
        if let Err(e) = quiet(&self.player).arg(sound).spawn() {
            tracing::debug!(player = %self.player, error = %e, "audio cue failed");
        }
    }

    async fn toast(&self, alert: &Alert) {
        let Some(proxy) = &self.notifications else {
            println!("[{}] {}", alert.title, alert.body.replace('\n', " | "));
            return;
        };
        let sent = proxy
            .notify(
                "rosterd",
                0,
                "appointment-soon",
                &alert.title,
                &alert.body,
                &[],
                HashMap::new(),
                -1,
            )
            .await;
        if let Err(e) = sent {
            tracing::warn!(key = %alert.key, error = %e, "toast failed");
        }
    }
}

impl AlertSink for DesktopAlerter {
    async fn raise(&self, alert: &Alert) {
        tracing::info!(key = %alert.key, title = %alert.title, "alert");
        self.play_sound();
        self.speaker.speak(&alert.speech);
        self.toast(alert).await;
    }
}

async fn notifications_proxy() -> zbus::Result<NotificationsProxy<'static>> {
    let conn = zbus::Connection::session().await?;
    NotificationsProxy::new(&conn).await
}

fn quiet(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Sink that remembers what it was asked to raise.
    #[derive(Default)]
    pub struct RecordingSink {
        pub raised: Mutex<Vec<Alert>>,
    }

    impl RecordingSink {
        pub fn keys(&self) -> Vec<String> {
            self.raised
                .lock()
                .unwrap()
                .iter()
                .map(|a| a.key.clone())
                .collect()
        }
    }

    impl AlertSink for RecordingSink {
        async fn raise(&self, alert: &Alert) {
            self.raised.lock().unwrap().push(alert.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_speaker_without_command_is_silent() {
        let speaker = Speaker::new(None);
        speaker.speak("Reminder. Staff meeting at 09:00 AM");
        assert!(speaker.current.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_speech_engine_is_not_an_error() {
        let speaker = Speaker::new(Some("/nonexistent/roster-tts".into()));
        speaker.speak("first");
        speaker.speak("second");
        assert!(speaker.current.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_utterance_replaces_prior() {
        let speaker = Speaker::new(Some("sleep".into()));
        speaker.speak("5");
        let first = speaker.current.lock().unwrap().as_ref().and_then(Child::id);
        speaker.speak("5");
        let second = speaker.current.lock().unwrap().as_ref().and_then(Child::id);
        assert!(first.is_some());
        assert_ne!(first, second);
        if let Some(child) = speaker.current.lock().unwrap().as_mut() {
            let _ = child.start_kill();
        };
    }

    #[tokio::test]
    async fn test_alerter_without_bus_prints() {
        let alerter = DesktopAlerter {
            sound: None,
            player: "paplay".into(),
            speaker: Speaker::new(None),
            notifications: None,
        };
        alerter
            .raise(&Alert {
                key: "reminder:1".into(),
                title: "Reminder: Audit".into(),
                body: "01:30 PM at Room 4".into(),
                speech: "Reminder. Audit at 01:30 PM".into(),
            })
            .await;
    }
}
