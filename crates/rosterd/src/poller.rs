//! Polling loops for the reminder and assignment feeds.
//!
//! Each feed runs as its own task: it wakes on its interval or on a manual
//! refresh, fetches the upcoming items, and raises whatever the notifier
//! reports as newly due. Fetch failures are logged and the loop carries on.

use crate::alerts::AlertSink;
use chrono::{Local, NaiveDateTime};
use roster_client::{ApiClient, ApiResult};
use roster_core::{Alert, AssignmentNotifier, Reminder, ReminderNotifier, SuguanAssignment};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;

/// Where the feeds come from.
pub trait ScheduleSource: Send + Sync + 'static {
    /// Called before every poll. Returns false to skip the poll.
    fn prepare(&self) -> bool {
        true
    }

    fn reminders(&self) -> impl Future<Output = ApiResult<Vec<Reminder>>> + Send;

    fn assignments(&self) -> impl Future<Output = ApiResult<Vec<SuguanAssignment>>> + Send;
}

impl ScheduleSource for ApiClient {
    /// Pick up logins and logouts made by the CLI since the last poll.
    fn prepare(&self) -> bool {
        if self.auth().reload() && self.auth().is_logged_in() {
            tracing::info!("new login picked up");
            self.guard().rearm();
        }
        if !self.auth().is_logged_in() {
            tracing::debug!("not logged in, skipping poll");
            return false;
        }
        true
    }

    async fn reminders(&self) -> ApiResult<Vec<Reminder>> {
        self.upcoming_reminders().await
    }

    async fn assignments(&self) -> ApiResult<Vec<SuguanAssignment>> {
        self.upcoming_assignments().await
    }
}

/// One notifier together with the feed it consumes.
pub trait Feed: Send + 'static {
    type Item: Send + Sync;
    const NAME: &'static str;

    fn fetch<S: ScheduleSource>(source: &S) -> impl Future<Output = ApiResult<Vec<Self::Item>>> + Send;
    fn evaluate(&mut self, now: NaiveDateTime, items: &[Self::Item]) -> Vec<Alert>;
    fn notified_count(&self) -> usize;
}

impl Feed for ReminderNotifier {
    type Item = Reminder;
    const NAME: &'static str = "reminders";

    fn fetch<S: ScheduleSource>(source: &S) -> impl Future<Output = ApiResult<Vec<Reminder>>> + Send {
        source.reminders()
    }

    fn evaluate(&mut self, now: NaiveDateTime, items: &[Reminder]) -> Vec<Alert> {
        ReminderNotifier::evaluate(self, now, items)
    }

    fn notified_count(&self) -> usize {
        ReminderNotifier::notified_count(self)
    }
}

impl Feed for AssignmentNotifier {
    type Item = SuguanAssignment;
    const NAME: &'static str = "assignments";

    fn fetch<S: ScheduleSource>(
        source: &S,
    ) -> impl Future<Output = ApiResult<Vec<SuguanAssignment>>> + Send {
        source.assignments()
    }

    fn evaluate(&mut self, now: NaiveDateTime, items: &[SuguanAssignment]) -> Vec<Alert> {
        AssignmentNotifier::evaluate(self, now, items)
    }

    fn notified_count(&self) -> usize {
        AssignmentNotifier::notified_count(self)
    }
}

/// Counters exposed through `Status()`.
#[derive(Default)]
pub struct FeedStats {
    polls: AtomicU64,
    alerts: AtomicU64,
    errors: AtomicU64,
    notified: AtomicUsize,
    last_poll: Mutex<Option<NaiveDateTime>>,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub polls: u64,
    pub alerts: u64,
    pub errors: u64,
    pub notified: usize,
    pub last_poll: Option<NaiveDateTime>,
    pub last_error: Option<String>,
}

impl FeedStats {
    fn record_poll(&self, now: NaiveDateTime, raised: usize, notified: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.alerts.fetch_add(raised as u64, Ordering::Relaxed);
        self.notified.store(notified, Ordering::Relaxed);
        *self.last_poll.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn record_error(&self, error: String) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            notified: self.notified.load(Ordering::Relaxed),
            last_poll: *self.last_poll.lock().unwrap_or_else(PoisonError::into_inner),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// One poll: fetch, evaluate at `now`, raise. Returns the number of alerts.
pub async fn poll_once<F, S, A>(
    feed: &mut F,
    source: &S,
    sink: &A,
    stats: &FeedStats,
    now: NaiveDateTime,
) -> usize
where
    F: Feed,
    S: ScheduleSource,
    A: AlertSink,
{
    if !source.prepare() {
        return 0;
    }
    let items = match F::fetch(source).await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(feed = F::NAME, error = %e, "poll failed");
            stats.record_error(e.to_string());
            return 0;
        }
    };
    let alerts = feed.evaluate(now, &items);
    for alert in &alerts {
        sink.raise(alert).await;
    }
    stats.record_poll(now, alerts.len(), feed.notified_count());
    tracing::debug!(feed = F::NAME, items = items.len(), raised = alerts.len(), "poll done");
    alerts.len()
}

/// Poll on `every` and on `refresh` until `shutdown` flips or its sender
/// goes away. The first poll happens immediately.
pub async fn run_feed<F, S, A>(
    mut feed: F,
    source: Arc<S>,
    sink: Arc<A>,
    every: Duration,
    refresh: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<FeedStats>,
) where
    F: Feed,
    S: ScheduleSource,
    A: AlertSink,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(feed = F::NAME, every_secs = every.as_secs(), "poller started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = refresh.notified() => {
                tracing::debug!(feed = F::NAME, "manual refresh");
            }
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
        let now = Local::now().naive_local();
        poll_once(&mut feed, source.as_ref(), sink.as_ref(), &stats, now).await;
    }
    tracing::info!(feed = F::NAME, "poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::testing::RecordingSink;
    use chrono::{Duration as Span, NaiveDate};
    use roster_client::ApiError;
    use roster_core::RecordId;

    #[derive(Default)]
    struct FakeSource {
        reminders: Mutex<Vec<Reminder>>,
        assignments: Mutex<Vec<SuguanAssignment>>,
        fetches: AtomicUsize,
        failing: std::sync::atomic::AtomicBool,
        logged_out: std::sync::atomic::AtomicBool,
    }

    impl ScheduleSource for FakeSource {
        fn prepare(&self) -> bool {
            !self.logged_out.load(Ordering::SeqCst)
        }

        async fn reminders(&self) -> ApiResult<Vec<Reminder>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 502,
                    message: None,
                });
            }
            Ok(self.reminders.lock().unwrap().clone())
        }

        async fn assignments(&self) -> ApiResult<Vec<SuguanAssignment>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.assignments.lock().unwrap().clone())
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn reminder(id: i64, at: NaiveDateTime) -> Reminder {
        Reminder {
            id: RecordId::from(id),
            title: format!("Reminder {id}"),
            date: at.date(),
            time: at.time(),
            description: None,
            location: None,
        }
    }

    fn assignment(id: i64, at: NaiveDateTime) -> SuguanAssignment {
        SuguanAssignment {
            id: RecordId::from(id),
            name: format!("Duty {id}"),
            date: at.date(),
            time: at.time(),
            description: None,
            location: Some("Chapel".into()),
        }
    }

    #[tokio::test]
    async fn test_reminder_fires_once_across_polls() {
        let source = FakeSource::default();
        source
            .reminders
            .lock()
            .unwrap()
            .extend([reminder(1, now() + Span::minutes(5)), reminder(2, now() + Span::hours(2))]);
        let sink = RecordingSink::default();
        let stats = FeedStats::default();
        let mut feed = ReminderNotifier::default();

        assert_eq!(poll_once(&mut feed, &source, &sink, &stats, now()).await, 1);
        assert_eq!(
            poll_once(&mut feed, &source, &sink, &stats, now() + Span::seconds(15)).await,
            0
        );
        assert_eq!(sink.keys(), vec!["reminder:1".to_string()]);

        let snap = stats.snapshot();
        assert_eq!(snap.polls, 2);
        assert_eq!(snap.alerts, 1);
        assert_eq!(snap.notified, 1);
    }

    #[tokio::test]
    async fn test_assignment_milestones_follow_refreshed_items() {
        let source = FakeSource::default();
        source
            .assignments
            .lock()
            .unwrap()
            .push(assignment(9, now() + Span::hours(13)));
        let sink = RecordingSink::default();
        let stats = FeedStats::default();
        let mut feed = AssignmentNotifier::default();

        poll_once(&mut feed, &source, &sink, &stats, now()).await;
        poll_once(&mut feed, &source, &sink, &stats, now() + Span::minutes(1)).await;
        // rescheduled server-side: last fetch wins
        *source.assignments.lock().unwrap() = vec![assignment(9, now() + Span::hours(4))];
        poll_once(&mut feed, &source, &sink, &stats, now() + Span::minutes(2)).await;

        assert_eq!(sink.keys().len(), 2);
        assert!(sink.keys()[0].contains("12 Hours Before"));
        assert!(sink.keys()[1].contains("3 Hours Before"));
    }

    #[tokio::test]
    async fn test_fetch_error_is_recorded_not_raised() {
        let source = FakeSource::default();
        source.failing.store(true, Ordering::SeqCst);
        let sink = RecordingSink::default();
        let stats = FeedStats::default();
        let mut feed = ReminderNotifier::default();

        assert_eq!(poll_once(&mut feed, &source, &sink, &stats, now()).await, 0);
        let snap = stats.snapshot();
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.polls, 0);
        assert!(snap.last_error.unwrap().contains("502"));
    }

    #[tokio::test]
    async fn test_logged_out_skips_fetch() {
        let source = FakeSource::default();
        source.logged_out.store(true, Ordering::SeqCst);
        let stats = FeedStats::default();
        poll_once(
            &mut ReminderNotifier::default(),
            &source,
            &RecordingSink::default(),
            &stats,
            now(),
        )
        .await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loop_polls_on_refresh_and_stops_on_shutdown() {
        let source = Arc::new(FakeSource::default());
        let refresh = Arc::new(Notify::new());
        let stats = Arc::new(FeedStats::default());
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_feed(
            ReminderNotifier::default(),
            source.clone(),
            Arc::new(RecordingSink::default()),
            Duration::from_secs(3600),
            refresh.clone(),
            stop_rx,
            stats.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        refresh.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("poller stops")
            .unwrap();
        assert_eq!(stats.snapshot().polls, 2);
    }
}
