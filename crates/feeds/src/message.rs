//! Wire types of the gasz feed and the messages the ingestor emits.

use gasbot_core::GasPrice;
use serde::{Deserialize, Serialize};

/// Subscription request sent right after the websocket opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub field: String,
    pub threshold: f64,
    pub operator: String,
}

impl SubscriptionRequest {
    /// Ask for every update regardless of value.
    pub fn all() -> Self {
        Self {
            kind: "subscription".to_string(),
            field: "*".to_string(),
            threshold: 1.0,
            operator: "*".to_string(),
        }
    }
}

/// Server answer to a [`SubscriptionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl SubscriptionResponse {
    /// `code == 1` is the only accepted answer.
    pub fn is_accepted(&self) -> bool {
        self.code == 1
    }
}

/// Message sent from the ingestor to the notification loop.
#[derive(Debug, Clone)]
pub enum FeedMessage {
    /// A new snapshot, already published to the shared cell
    Snapshot(GasPrice),
    /// Connection lifecycle event
    Event(ConnectionEvent),
}

/// Connection lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Subscription accepted (first time).
    Connected,
    /// Subscription accepted after a reconnect.
    Reconnected,
    /// Connection lost; the string carries the reason.
    Disconnected(String),
}

impl From<ConnectionEvent> for FeedMessage {
    fn from(event: ConnectionEvent) -> Self {
        FeedMessage::Event(event)
    }
}

impl From<GasPrice> for FeedMessage {
    fn from(price: GasPrice) -> Self {
        FeedMessage::Snapshot(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_subscription_request_wire_format() {
        let json = serde_json::to_value(SubscriptionRequest::all()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "subscription",
                "field": "*",
                "threshold": 1.0,
                "operator": "*"
            })
        );
    }

    #[test]
    fn test_subscription_response() {
        let ok: SubscriptionResponse =
            serde_json::from_str(r#"{"code":1,"message":"Subscribed to `gasz`"}"#).unwrap();
        assert!(ok.is_accepted());

        let denied: SubscriptionResponse =
            serde_json::from_str(r#"{"code":0,"message":"Bad request"}"#).unwrap();
        assert!(!denied.is_accepted());

        let bare: SubscriptionResponse = serde_json::from_str(r#"{"code":1}"#).unwrap();
        assert_eq!(bare.message, "");
    }

    #[test]
    fn test_feed_message_from() {
        let msg: FeedMessage = ConnectionEvent::Connected.into();
        assert!(matches!(msg, FeedMessage::Event(ConnectionEvent::Connected)));

        let msg: FeedMessage = GasPrice::new(4.0, 3.0, 2.0, 1.0).into();
        assert!(matches!(msg, FeedMessage::Snapshot(_)));
    }
}
