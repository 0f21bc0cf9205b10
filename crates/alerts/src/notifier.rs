//! Notification passes.
//!
//! Each new snapshot triggers one pass over the registry: every confirmed
//! subscriber whose rule holds gets a message through the [`Transport`].
//! A failed delivery is logged and skipped; it never stops the pass.

use crate::registry::SubscriberRegistry;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use gasbot_core::{Criterion, GasPrice, Recipient, SubscriberId};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound message channel to a subscriber.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, recipient: &Recipient, text: &str) -> Result<(), TransportError>;
}

/// When a matching rule produces a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Every pass in which the rule holds.
    #[default]
    Level,
    /// Only the first pass after the rule starts holding.
    Edge,
}

impl FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "level" => Ok(TriggerMode::Level),
            "edge" => Ok(TriggerMode::Edge),
            other => Err(format!("unknown trigger mode '{}', expected 'level' or 'edge'", other)),
        }
    }
}

impl std::fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerMode::Level => f.write_str("level"),
            TriggerMode::Edge => f.write_str("edge"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Upper bound on a single delivery.
    pub send_timeout: Duration,
    /// Deliveries in flight at once during a pass.
    pub max_concurrent_sends: usize,
    pub trigger_mode: TriggerMode,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(3),
            max_concurrent_sends: 8,
            trigger_mode: TriggerMode::Level,
        }
    }
}

/// Counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Subscribers whose rule held.
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Matches held back because the rule was already firing (edge mode).
    pub suppressed: usize,
}

pub struct Notifier {
    registry: Arc<SubscriberRegistry>,
    transport: Arc<dyn Transport>,
    config: NotifierConfig,
    /// Rules that matched on the previous pass, edge mode only.
    fired: Mutex<HashMap<SubscriberId, Criterion>>,
}

impl Notifier {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        transport: Arc<dyn Transport>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
            fired: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Run one pass against `price`.
    pub async fn notify(&self, price: &GasPrice) -> PassReport {
        let ready = self.registry.ready().await;
        let mut report = PassReport::default();
        let edge = self.config.trigger_mode == TriggerMode::Edge;

        let deliveries: Vec<(Recipient, Criterion, String)> = {
            let mut fired = self.fired.lock().await;
            if edge {
                // Forget subscribers that left or changed their rule.
                let current: HashMap<&SubscriberId, &Criterion> =
                    ready.iter().map(|(r, c)| (&r.id, c)).collect();
                fired.retain(|id, previous| current.get(id).is_some_and(|c| **c == *previous));
            }

            let mut deliveries = Vec::new();
            for (recipient, criterion) in ready {
                if !criterion.satisfied_by(price) {
                    if edge {
                        fired.remove(&recipient.id);
                    }
                    continue;
                }

                report.matched += 1;
                if edge {
                    if fired.get(&recipient.id) == Some(&criterion) {
                        report.suppressed += 1;
                        continue;
                    }
                    fired.insert(recipient.id.clone(), criterion);
                }

                let text = criterion.render_notification(price);
                deliveries.push((recipient, criterion, text));
            }
            deliveries
        };

        if deliveries.is_empty() {
            debug!(matched = report.matched, suppressed = report.suppressed, "No alerts to send");
            return report;
        }

        let results: Vec<(Recipient, Result<(), TransportError>)> = stream::iter(deliveries)
            .map(|(recipient, criterion, text)| async move {
                let result = self.deliver(&recipient, &text).await;
                if let Err(ref e) = result {
                    error!(
                        subscriber = %recipient.id,
                        chat_id = recipient.chat_id,
                        %criterion,
                        error = %e,
                        "Failed to send alert"
                    );
                }
                (recipient, result)
            })
            .buffer_unordered(self.config.max_concurrent_sends.max(1))
            .collect()
            .await;

        let mut failed_ids = Vec::new();
        for (recipient, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    report.failed += 1;
                    failed_ids.push(recipient.id);
                }
            }
        }

        // A failed edge-triggered alert is retried on the next matching pass.
        if edge && !failed_ids.is_empty() {
            let mut fired = self.fired.lock().await;
            for id in &failed_ids {
                fired.remove(id);
            }
        }

        info!(
            matched = report.matched,
            delivered = report.delivered,
            failed = report.failed,
            suppressed = report.suppressed,
            "Notification pass complete"
        );
        report
    }

    async fn deliver(&self, recipient: &Recipient, text: &str) -> Result<(), TransportError> {
        let timeout = self.config.send_timeout;
        match tokio::time::timeout(timeout, self.transport.send(recipient, text)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}
