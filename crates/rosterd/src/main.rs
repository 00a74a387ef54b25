use anyhow::Result;
use roster_client::{ApiClient, AuthStore, Navigator, UnauthorizedGuard};
use roster_core::{AssignmentNotifier, ReminderNotifier};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing_subscriber::EnvFilter;

mod alerts;
mod config;
mod dbus_interface;
mod poller;

use alerts::DesktopAlerter;
use dbus_interface::{NotifierService, BUS_NAME, OBJECT_PATH};
use poller::{run_feed, FeedStats};

/// The daemon has no screens; a rejected session just asks for a fresh login.
struct DaemonNavigator;

impl Navigator for DaemonNavigator {
    fn current_route(&self) -> String {
        "/notifier".to_string()
    }

    fn redirect(&self, _route: &str) {
        tracing::warn!("session expired; run `roster login` to resume notifications");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rosterd starting");
    let config = config::Config::from_env();

    let auth = Arc::new(AuthStore::open(&config.api.session_path));
    let guard = Arc::new(UnauthorizedGuard::new(DaemonNavigator));
    let api = Arc::new(ApiClient::new(config.api.clone(), auth.clone(), guard)?);
    tracing::info!(
        api = %config.api.main_base,
        session = %config.api.session_path.display(),
        logged_in = auth.is_logged_in(),
        "api client ready"
    );

    let sink = Arc::new(DesktopAlerter::connect(&config).await);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reminder_stats = Arc::new(FeedStats::default());
    let assignment_stats = Arc::new(FeedStats::default());
    let reminder_refresh = Arc::new(Notify::new());
    let assignment_refresh = Arc::new(Notify::new());

    let reminders = tokio::spawn(run_feed(
        ReminderNotifier::default(),
        api.clone(),
        sink.clone(),
        config.reminder_poll,
        reminder_refresh.clone(),
        shutdown_rx.clone(),
        reminder_stats.clone(),
    ));
    let assignments = tokio::spawn(run_feed(
        AssignmentNotifier::new(chrono::Duration::hours(config.lookahead_hours)),
        api.clone(),
        sink,
        config.assignment_poll,
        assignment_refresh.clone(),
        shutdown_rx,
        assignment_stats.clone(),
    ));

    let service = NotifierService {
        auth,
        reminders: reminder_stats,
        assignments: assignment_stats,
        refresh: vec![reminder_refresh, assignment_refresh],
    };
    // Held for the lifetime of the daemon; dropping it releases the bus name.
    let _conn = match serve(service).await {
        Ok(conn) => {
            tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "D-Bus interface registered");
            Some(conn)
        }
        Err(e) => {
            tracing::warn!(error = %e, "session bus unavailable; running without D-Bus control");
            None
        }
    };

    tracing::info!("rosterd ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("rosterd shutting down");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(reminders, assignments);
    Ok(())
}

async fn serve(service: NotifierService) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
}
