//! Webhook subscription and delivery-log domain models (§4.6, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::EventType;

/// An operator-registered HTTP endpoint subscribed to a set of event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub id: String,
    pub url: String,
    pub events: Vec<EventType>,
    pub secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookTarget {
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>, events: Vec<EventType>, secret: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            url: url.into(),
            events,
            secret,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failure,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// One row in `webhook_delivery_logs` (§6): every attempt, success or
/// failure, is appended — never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryLog {
    pub id: String,
    pub webhook_id: String,
    pub event_type: EventType,
    pub attempt: u32,
    pub status: DeliveryStatus,
    pub response_status: Option<u16>,
    pub error: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl WebhookDeliveryLog {
    #[must_use]
    pub fn new(id: impl Into<String>, webhook_id: impl Into<String>, event_type: EventType, attempt: u32, status: DeliveryStatus, response_status: Option<u16>, error: Option<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            webhook_id: webhook_id.into(),
            event_type,
            attempt,
            status,
            response_status,
            error,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Upper bound on delivery attempts per event (§4.6).
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// `baseDelayMs × 2^(attempt-2)` (§4.6) — note this is keyed on `attempt`,
/// not `retryCount`, and is distinct from `calculateBackoffDelay` used by
/// command dispatch.
#[must_use]
pub fn webhook_retry_delay_ms(base_delay_ms: u64, attempt: u32) -> u64 {
    if attempt < 2 {
        return 0;
    }
    base_delay_ms.saturating_mul(1_u64 << (attempt - 2).min(62))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribes_to_checks_event_membership() {
        let target = WebhookTarget::new("wh-1", "https://example.com/hook", vec![EventType::HostStatusTransition], None);
        assert!(target.subscribes_to(EventType::HostStatusTransition));
        assert!(!target.subscribes_to(EventType::ScanComplete));
    }

    #[test]
    fn webhook_retry_delay_ms_doubles_from_second_attempt() {
        assert_eq!(webhook_retry_delay_ms(1000, 1), 0);
        assert_eq!(webhook_retry_delay_ms(1000, 2), 1000);
        assert_eq!(webhook_retry_delay_ms(1000, 3), 2000);
    }
}
