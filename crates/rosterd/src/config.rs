use roster_client::ApiConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for the assignment lookahead: one year.
const MAX_LOOKAHEAD_HOURS: u64 = 24 * 366;

const DEFAULT_ALERT_SOUND: &str = "/usr/share/sounds/freedesktop/stereo/message.oga";

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    pub api: ApiConfig,
    pub reminder_poll: Duration,
    pub assignment_poll: Duration,
    /// Assignments further away than this are ignored.
    pub lookahead_hours: i64,
    /// Audio cue played for every alert; `None` disables it.
    pub alert_sound: Option<PathBuf>,
    pub sound_player: String,
    /// Text-to-speech command; `None` disables speech.
    pub speech_cmd: Option<String>,
    /// Send toasts to `org.freedesktop.Notifications` instead of stdout.
    pub desktop_notify: bool,
}

impl Config {
    /// Load configuration from `ROSTER_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            reminder_poll: Duration::from_secs(env_u64("ROSTER_REMINDER_POLL_SECS", 15).max(1)),
            assignment_poll: Duration::from_secs(env_u64("ROSTER_ASSIGNMENT_POLL_SECS", 20).max(1)),
            lookahead_hours: clamp_lookahead(env_u64(
                "ROSTER_ASSIGNMENT_LOOKAHEAD_HOURS",
                roster_core::notifier::DEFAULT_LOOKAHEAD_HOURS.unsigned_abs(),
            )),
            alert_sound: env_opt("ROSTER_ALERT_SOUND", DEFAULT_ALERT_SOUND).map(PathBuf::from),
            sound_player: std::env::var("ROSTER_SOUND_PLAYER").unwrap_or_else(|_| "paplay".to_string()),
            speech_cmd: env_opt("ROSTER_SPEECH_CMD", "espeak-ng"),
            desktop_notify: env_bool("ROSTER_DESKTOP_NOTIFY", true),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn clamp_lookahead(hours: u64) -> i64 {
    if hours > MAX_LOOKAHEAD_HOURS {
        tracing::warn!(hours, max = MAX_LOOKAHEAD_HOURS, "assignment lookahead clamped");
    }
    i64::try_from(hours.min(MAX_LOOKAHEAD_HOURS)).unwrap_or(i64::MAX)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

/// Unset means `default`; set-but-empty turns the feature off.
fn env_opt(key: &str, default: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(v),
        Err(_) => Some(default.to_string()),
    }
}
