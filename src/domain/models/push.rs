//! Push-device and notification-preference domain models (§4.7, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::EventType;

/// Mobile platform a device token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ios" => Some(Self::Ios),
            "android" => Some(Self::Android),
            _ => None,
        }
    }
}

/// A registered push device token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushDevice {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PushDevice {
    #[must_use]
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, platform: Platform, token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            platform,
            token: token.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A per-user window in which push notifications are suppressed (§4.7).
/// `start_hour == end_hour` means *all day*; `start_hour > end_hour` wraps
/// across midnight. Hours are local to `timezone`, falling back to UTC if
/// the timezone name can't be resolved by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHours {
    pub start_hour: u8,
    pub end_hour: u8,
    pub timezone: Option<String>,
}

impl QuietHours {
    /// Whether `hour` (already resolved to local time by the caller) falls
    /// inside the window.
    #[must_use]
    pub fn contains_hour(&self, hour: u8) -> bool {
        if self.start_hour == self.end_hour {
            return true;
        }
        if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Per-user push configuration (§4.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: String,
    pub enabled: bool,
    pub events: Vec<EventType>,
    pub quiet_hours: Option<QuietHours>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            enabled: true,
            events: Vec::new(),
            quiet_hours: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a device belonging to this user should receive a push for
    /// `event_type` at `local_hour` (§4.7: enabled, subscribed, and outside
    /// quiet hours).
    #[must_use]
    pub fn allows(&self, event_type: EventType, local_hour: u8) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.events.contains(&event_type) {
            return false;
        }
        if let Some(quiet_hours) = &self.quiet_hours {
            if quiet_hours.contains_hour(local_hour) {
                return false;
            }
        }
        true
    }
}

/// Outcome of a single provider `send` call (§4.7).
#[derive(Debug, Clone)]
pub struct PushSendResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub permanent_failure: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs_with(events: Vec<EventType>, quiet_hours: Option<QuietHours>) -> NotificationPreferences {
        let mut prefs = NotificationPreferences::new("u1");
        prefs.events = events;
        prefs.quiet_hours = quiet_hours;
        prefs
    }

    #[test]
    fn disabled_preferences_never_allow() {
        let mut prefs = prefs_with(vec![EventType::HostStatusTransition], None);
        prefs.enabled = false;
        assert!(!prefs.allows(EventType::HostStatusTransition, 10));
    }

    #[test]
    fn unsubscribed_event_is_not_allowed() {
        let prefs = prefs_with(vec![EventType::ScanComplete], None);
        assert!(!prefs.allows(EventType::HostStatusTransition, 10));
    }

    #[test]
    fn quiet_hours_window_suppresses_matching_hour() {
        let quiet = QuietHours { start_hour: 9, end_hour: 17, timezone: None };
        let prefs = prefs_with(vec![EventType::HostStatusTransition], Some(quiet));
        assert!(!prefs.allows(EventType::HostStatusTransition, 10));
        assert!(prefs.allows(EventType::HostStatusTransition, 20));
    }

    #[test]
    fn quiet_hours_wrapping_midnight() {
        let quiet = QuietHours { start_hour: 22, end_hour: 6, timezone: None };
        assert!(quiet.contains_hour(23));
        assert!(quiet.contains_hour(2));
        assert!(!quiet.contains_hour(12));
    }

    #[test]
    fn quiet_hours_equal_bounds_means_all_day() {
        let quiet = QuietHours { start_hour: 8, end_hour: 8, timezone: None };
        assert!(quiet.contains_hour(0));
        assert!(quiet.contains_hour(23));
    }

    #[test]
    fn platform_round_trips_through_as_str() {
        assert_eq!(Platform::from_str(Platform::Ios.as_str()), Some(Platform::Ios));
        assert_eq!(Platform::from_str(Platform::Android.as_str()), Some(Platform::Android));
    }
}
