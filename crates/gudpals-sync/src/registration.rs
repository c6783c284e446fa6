use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};
use uuid::Uuid;

use gudpals_types::api::NotificationCreate;
use gudpals_types::models::{Activity, NotificationKind, Registration};

use crate::error::Result;
use crate::gateway::Gateway;

/// Lead times before an activity starts at which reminders are delivered.
pub fn reminder_leads() -> [Duration; 3] {
    [Duration::hours(24), Duration::hours(1), Duration::minutes(15)]
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Created(Registration),
    /// The user was already registered; nothing was written
    Existing(Registration),
}

impl RegistrationOutcome {
    pub fn registration(&self) -> &Registration {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    pub fn into_registration(self) -> Registration {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Create-or-noop writes for activity registrations.
///
/// The existence check and the insert are separate gateway calls. Two
/// concurrent callers can both pass the check; unless the store carries
/// the unique registration index, both inserts succeed.
#[derive(Clone)]
pub struct RegistrationWriter<G: Gateway> {
    gateway: G,
}

impl<G: Gateway> RegistrationWriter<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub async fn register_once(&self, user_id: &str, activity_id: Uuid) -> Result<RegistrationOutcome> {
        if let Some(existing) = self.gateway.find_registration(user_id, activity_id).await? {
            info!("{} already registered for {}", user_id, activity_id);
            return Ok(RegistrationOutcome::Existing(existing));
        }

        let registration = self.gateway.insert_registration(user_id, activity_id).await?;
        self.after_register(user_id, activity_id).await;
        Ok(RegistrationOutcome::Created(registration))
    }

    /// Remove the registration if present. Absent is not an error.
    pub async fn unregister(&self, user_id: &str, activity_id: Uuid) -> Result<usize> {
        self.gateway.delete_registration(user_id, activity_id).await
    }

    pub async fn is_registered(&self, user_id: &str, activity_id: Uuid) -> Result<bool> {
        Ok(self
            .gateway
            .find_registration(user_id, activity_id)
            .await?
            .is_some())
    }

    pub async fn registrations(&self, user_id: &str) -> Result<Vec<Registration>> {
        self.gateway.registrations_for_user(user_id).await
    }

    /// Confirmation and reminders. Nothing here fails the registration.
    async fn after_register(&self, user_id: &str, activity_id: Uuid) {
        let activity = match self.gateway.activity(activity_id).await {
            Ok(activity) => activity,
            Err(e) => {
                error!("Error fetching activity {} for reminders: {}", activity_id, e);
                return;
            }
        };

        let mut pending = reminder_notifications(user_id, &activity, Utc::now());
        pending.push(NotificationCreate {
            user_id: user_id.to_string(),
            title: "Registration Successful".into(),
            body: format!("You've successfully registered for {}", activity.title),
            kind: NotificationKind::Registration,
            action_url: None,
            deliver_at: None,
        });

        for notification in pending {
            if let Err(e) = self.gateway.insert_notification(notification).await {
                error!("Error scheduling notification for {}: {}", user_id, e);
            }
        }
    }
}

/// Reminder notifications for every lead time still in the future.
pub fn reminder_notifications(user_id: &str, activity: &Activity, now: DateTime<Utc>) -> Vec<NotificationCreate> {
    let Some(starts_at) = activity.starts_at else {
        return Vec::new();
    };

    reminder_leads()
        .into_iter()
        .map(|lead| starts_at - lead)
        .filter(|at| *at > now)
        .map(|at| NotificationCreate {
            user_id: user_id.to_string(),
            title: "Event Reminder".into(),
            body: format!(
                "Don't forget: {} starts in {}",
                activity.title,
                lead_label(starts_at - at)
            ),
            kind: NotificationKind::Reminder,
            action_url: Some("/events".into()),
            deliver_at: Some(at),
        })
        .collect()
}

fn lead_label(lead: Duration) -> String {
    let hours = lead.num_hours();
    match hours {
        h if h >= 24 => "24 hours".to_string(),
        1 => "1 hour".to_string(),
        h if h > 1 => format!("{} hours", h),
        _ => format!("{} minutes", lead.num_minutes()),
    }
}
