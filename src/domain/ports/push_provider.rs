//! Per-platform push-notification provider port (§4.7). The concrete
//! FCM/APNS HTTP integrations are out of scope — only the interface is
//! specified here, plus a null test double.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::models::push::PushSendResult;

/// A single push message to deliver to one device token.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: Value,
}

/// Sends a push message to one device token on one platform (android via
/// FCM, ios via APNS). Implementations never propagate a transport error —
/// failures are folded into `PushSendResult` so `PushDispatcher` can decide
/// whether to prune the device (§4.7 permanent-failure handling).
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> PushSendResult;
}

/// A provider that accepts every send without making a network call.
/// Useful for local development and for the core's own tests — it is the
/// only concrete `PushProvider` this crate ships (§4.7 note: concrete FCM
/// and APNS providers are an external collaborator's responsibility).
pub struct NullPushProvider;

#[async_trait]
impl PushProvider for NullPushProvider {
    async fn send(&self, _token: &str, _message: &PushMessage) -> PushSendResult {
        PushSendResult {
            success: true,
            status_code: Some(200),
            error: None,
            permanent_failure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn null_push_provider_always_succeeds() {
        let provider = NullPushProvider;
        let message = PushMessage {
            title: "Host Awake".to_string(),
            body: "desktop@lab-node-1 is awake".to_string(),
            data: json!({"hostFqn": "desktop@lab-node-1"}),
        };
        let result = provider.send("device-token", &message).await;
        assert!(result.success);
        assert!(!result.permanent_failure);
    }
}
