use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use gudpals_sync::LocalGateway;
use gudpals_sync::reminders::run_sweep;

/// Background task that sends event reminders.
///
/// Runs on an interval; each tick checks activities starting within the
/// next day and notifies their registrants.
pub async fn run_reminder_loop(gateway: LocalGateway, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match run_sweep(&gateway, Utc::now()).await {
            Ok(summary) => {
                if summary.notifications_sent > 0 {
                    info!(
                        "Reminders: sent {} across {} activities",
                        summary.notifications_sent, summary.events_checked
                    );
                }
            }
            Err(e) => {
                warn!("Reminder sweep error: {}", e);
            }
        }
    }
}
