//! Periodic reminder sweep over upcoming activities.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use gudpals_types::api::{NotificationCreate, ReminderSweepResponse};
use gudpals_types::models::{Activity, NotificationKind};

use crate::error::Result;
use crate::gateway::Gateway;
use crate::local::LocalGateway;

/// How far ahead the sweep looks for activities.
const HORIZON_HOURS: i64 = 25;

/// The lead times a reminder is sent at. Each is sent at most once per
/// registrant, however often the sweep runs inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderWindow {
    DayBefore,
    HourBefore,
    Starting,
}

impl ReminderWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DayBefore => "day",
            Self::HourBefore => "hour",
            Self::Starting => "starting",
        }
    }

    /// The window `until` (time left before the start) falls in, if any.
    pub fn containing(until: Duration) -> Option<Self> {
        if until <= Duration::hours(24) && until >= Duration::minutes(23 * 60 + 30) {
            Some(Self::DayBefore)
        } else if until <= Duration::hours(1) && until >= Duration::minutes(45) {
            Some(Self::HourBefore)
        } else if until <= Duration::minutes(15) && until >= Duration::minutes(10) {
            Some(Self::Starting)
        } else {
            None
        }
    }
}

/// Reminder text if `starts_at` falls inside one of the sweep windows
/// measured from `now`.
pub fn reminder_message(
    activity: &Activity,
    starts_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<(ReminderWindow, String)> {
    let window = ReminderWindow::containing(starts_at - now)?;
    let text = match window {
        ReminderWindow::DayBefore => format!(
            "Don't forget: {} starts tomorrow at {}",
            activity.title,
            starts_at.format("%H:%M UTC")
        ),
        ReminderWindow::HourBefore => format!("Starting soon: {} begins in 1 hour", activity.title),
        ReminderWindow::Starting => format!("Starting now: {} begins in 15 minutes", activity.title),
    };
    Some((window, text))
}

/// Notify every registrant of activities whose start falls inside a
/// reminder window they have not been reminded for yet. Individual
/// notification failures are logged and skipped, and retried next sweep.
pub async fn run_sweep(gateway: &LocalGateway, now: DateTime<Utc>) -> Result<ReminderSweepResponse> {
    let upcoming = gateway
        .blocking(move |db| db.activities_with_registrants(now, now + Duration::hours(HORIZON_HOURS)))
        .await?;

    info!("Checking reminders at {}: {} activities with registrations", now, upcoming.len());

    let mut summary = ReminderSweepResponse {
        events_checked: upcoming.len(),
        notifications_sent: 0,
    };

    for (activity, registrants) in upcoming {
        let Some(starts_at) = activity.starts_at else {
            continue;
        };
        let Some((window, message)) = reminder_message(&activity, starts_at, now) else {
            continue;
        };
        let activity_id = activity.id;

        for user_id in registrants {
            let claimer = user_id.clone();
            let claimed = gateway
                .blocking(move |db| db.claim_reminder(activity_id, &claimer, window.as_str(), now))
                .await?;
            if !claimed {
                debug!("{} already reminded for {} ({})", user_id, activity_id, window.as_str());
                continue;
            }

            let notification = NotificationCreate {
                user_id: user_id.clone(),
                title: "Event Reminder".into(),
                body: message.clone(),
                kind: NotificationKind::Reminder,
                action_url: Some("/events".into()),
                deliver_at: None,
            };
            match gateway.insert_notification(notification).await {
                Ok(_) => summary.notifications_sent += 1,
                Err(e) => {
                    error!("Error sending reminder to {}: {}", user_id, e);
                    let releaser = user_id.clone();
                    if let Err(e) = gateway
                        .blocking(move |db| db.release_reminder(activity_id, &releaser, window.as_str()))
                        .await
                    {
                        warn!("Could not release reminder claim for {}: {}", user_id, e);
                    }
                }
            }
        }
    }

    info!("Sent {} reminders", summary.notifications_sent);
    Ok(summary)
}
