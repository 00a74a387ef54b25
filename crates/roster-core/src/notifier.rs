//! Reminder and assignment notifiers.
//!
//! Both are pure state machines: a poll hands in the freshly fetched items
//! and the current local time, and gets back the alerts that crossed into
//! their window since the last poll. The "already notified" sets live in
//! memory only and reset when the process restarts.

use crate::schedule::{Reminder, SuguanAssignment};
use crate::types::RecordId;
use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;
use tracing::{debug, info};

/// A local alert to raise: audio cue, spoken text, and a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Deduplication key (`reminder:<id>` or `suguan:<id>:<milestone>`).
    pub key: String,
    pub title: String,
    pub body: String,
    pub speech: String,
}

/// Time window around a reminder's start in which it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderWindow {
    /// How long before the event the window opens.
    pub lead: Duration,
    /// How long after the event the window stays open.
    pub grace: Duration,
}

impl Default for ReminderWindow {
    fn default() -> Self {
        Self {
            lead: Duration::minutes(5),
            grace: Duration::seconds(30),
        }
    }
}

impl ReminderWindow {
    /// `remaining` is event time minus now; negative once the event started.
    pub fn contains(&self, remaining: Duration) -> bool {
        remaining <= self.lead && remaining >= -self.grace
    }
}

/// Fires each reminder once when it enters its window.
pub struct ReminderNotifier {
    window: ReminderWindow,
    notified: HashSet<RecordId>,
}

impl ReminderNotifier {
    pub fn new(window: ReminderWindow) -> Self {
        Self {
            window,
            notified: HashSet::new(),
        }
    }

    pub fn evaluate(&mut self, now: NaiveDateTime, reminders: &[Reminder]) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for reminder in reminders {
            let remaining = reminder.event_at() - now;
            if !self.window.contains(remaining) {
                continue;
            }
            if !self.notified.insert(reminder.id.clone()) {
                debug!(id = %reminder.id, "reminder already notified");
                continue;
            }
            info!(id = %reminder.id, title = %reminder.title, "reminder due");
            alerts.push(reminder_alert(reminder));
        }
        alerts
    }

    pub fn notified_count(&self) -> usize {
        self.notified.len()
    }
}

impl Default for ReminderNotifier {
    fn default() -> Self {
        Self::new(ReminderWindow::default())
    }
}

fn reminder_alert(reminder: &Reminder) -> Alert {
    let at = reminder.time.format("%I:%M %p").to_string();
    let mut body = at.clone();
    if let Some(location) = reminder.location.as_deref().filter(|l| !l.is_empty()) {
        body.push_str(&format!(" at {location}"));
    }
    if let Some(description) = reminder.description.as_deref().filter(|d| !d.is_empty()) {
        body.push('\n');
        body.push_str(description);
    }
    Alert {
        key: format!("reminder:{}", reminder.id),
        title: format!("Reminder: {}", reminder.title),
        body,
        speech: format!("Reminder. {} at {}", reminder.title, at),
    }
}

/// A named threshold before an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub label: &'static str,
    pub hours: i64,
}

impl Milestone {
    pub fn offset(&self) -> Duration {
        Duration::hours(self.hours)
    }
}

/// Milestones in descending order.
pub static MILESTONES: [Milestone; 5] = [
    Milestone { label: "1 Day Before", hours: 24 },
    Milestone { label: "12 Hours Before", hours: 12 },
    Milestone { label: "6 Hours Before", hours: 6 },
    Milestone { label: "3 Hours Before", hours: 3 },
    Milestone { label: "1 Hour Before", hours: 1 },
];

/// Default horizon beyond which assignments are ignored.
pub const DEFAULT_LOOKAHEAD_HOURS: i64 = 48;

/// Nearest milestone whose offset is not more than the time remaining.
///
/// Returns `None` once the assignment has started, when it is beyond the
/// lookahead, or when less than the smallest offset remains.
pub fn select_milestone(remaining: Duration, lookahead: Duration) -> Option<&'static Milestone> {
    if remaining <= Duration::zero() || remaining > lookahead {
        return None;
    }
    MILESTONES.iter().find(|m| m.offset() <= remaining)
}

/// Fires each (assignment, milestone) pair at most once.
pub struct AssignmentNotifier {
    lookahead: Duration,
    notified: HashSet<(RecordId, &'static str)>,
}

impl AssignmentNotifier {
    pub fn new(lookahead: Duration) -> Self {
        Self {
            lookahead,
            notified: HashSet::new(),
        }
    }

    pub fn evaluate(&mut self, now: NaiveDateTime, assignments: &[SuguanAssignment]) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for assignment in assignments {
            let remaining = assignment.event_at() - now;
            let Some(milestone) = select_milestone(remaining, self.lookahead) else {
                continue;
            };
            if !self.notified.insert((assignment.id.clone(), milestone.label)) {
                continue;
            }
            info!(
                id = %assignment.id,
                milestone = milestone.label,
                "assignment milestone reached"
            );
            alerts.push(assignment_alert(assignment, milestone));
        }
        alerts
    }

    pub fn notified_count(&self) -> usize {
        self.notified.len()
    }
}

impl Default for AssignmentNotifier {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_LOOKAHEAD_HOURS))
    }
}

fn assignment_alert(assignment: &SuguanAssignment, milestone: &Milestone) -> Alert {
    let when = format!(
        "{} {}",
        assignment.date.format("%b %d, %Y"),
        assignment.time.format("%I:%M %p")
    );
    let mut body = when.clone();
    if let Some(location) = assignment.location.as_deref().filter(|l| !l.is_empty()) {
        body.push_str(&format!(" at {location}"));
    }
    Alert {
        key: format!("suguan:{}:{}", assignment.id, milestone.label),
        title: format!("Suguan: {} ({})", assignment.name, milestone.label),
        body,
        speech: format!(
            "Suguan reminder, {}. {} on {}",
            milestone.label, assignment.name, when
        ),
    }
}
