//! Notification loop.
//!
//! Receives [`FeedMessage`]s from the push client and runs one notification
//! pass per snapshot. Passes run one at a time, in arrival order.

use crate::state::SharedState;
use gasbot_alerts::Notifier;
use gasbot_feeds::{ConnectionEvent, FeedMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run the notification loop until cancelled or the feed channel closes.
pub async fn run_notification_handler(
    mut rx: mpsc::Receiver<FeedMessage>,
    notifier: Arc<Notifier>,
    state: SharedState,
    cancel: CancellationToken,
) {
    debug!("Starting notification handler");

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        match msg {
            FeedMessage::Snapshot(price) => {
                state.stats.record_snapshot();
                debug!(%price, "Gas price update");
                let report = notifier.notify(&price).await;
                state.stats.record_pass(&report);
            }
            FeedMessage::Event(event) => process_event(event, &state),
        }
    }

    debug!("Notification handler stopped");
}

fn process_event(event: ConnectionEvent, state: &SharedState) {
    match event {
        ConnectionEvent::Connected => info!("Gas price feed connected"),
        ConnectionEvent::Reconnected => {
            state.stats.record_reconnect();
            info!("Gas price feed reconnected");
        }
        ConnectionEvent::Disconnected(reason) => {
            warn!(reason = %reason, "Gas price feed disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use async_trait::async_trait;
    use gasbot_alerts::{NotifierConfig, SubscriberRegistry, Transport, TransportError};
    use gasbot_core::{GasPrice, LatestGasPrice, Recipient};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, recipient: &Recipient, text: &str) -> Result<(), TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.chat_id, text.to_string()));
            Ok(())
        }
    }

    async fn setup() -> (SharedState, Arc<Notifier>, Arc<RecordingTransport>) {
        let registry = Arc::new(SubscriberRegistry::new());
        registry
            .subscribe(Recipient::new("alice", 42), "fast", "<", 30.0)
            .await
            .unwrap();
        let state = Arc::new(AppState::new(
            registry.clone(),
            Arc::new(LatestGasPrice::new()),
        ));
        let transport = Arc::new(RecordingTransport::default());
        let notifier = Arc::new(Notifier::new(
            registry,
            transport.clone(),
            NotifierConfig::default(),
        ));
        (state, notifier, transport)
    }

    #[tokio::test]
    async fn test_snapshots_trigger_passes() {
        let (state, notifier, transport) = setup().await;
        let (tx, rx) = mpsc::channel(8);

        tx.send(FeedMessage::Event(ConnectionEvent::Connected))
            .await
            .unwrap();
        tx.send(FeedMessage::Snapshot(GasPrice::new(40.0, 25.0, 20.0, 10.0)))
            .await
            .unwrap();
        tx.send(FeedMessage::Snapshot(GasPrice::new(40.0, 35.0, 20.0, 10.0)))
            .await
            .unwrap();
        tx.send(FeedMessage::Event(ConnectionEvent::Reconnected))
            .await
            .unwrap();
        drop(tx);

        run_notification_handler(rx, notifier, state.clone(), CancellationToken::new()).await;

        let summary = state.stats_summary();
        assert_eq!(summary.snapshots_received, 2);
        assert_eq!(summary.passes_run, 2);
        assert_eq!(summary.alerts_delivered, 1);
        assert_eq!(summary.reconnects, 1);
        assert_eq!(
            *transport.sent.lock().unwrap(),
            vec![(
                42,
                "Hey 👋, gas price for `fast` tx has reached : 25.00 Gwei".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let (state, notifier, _transport) = setup().await;
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_notification_handler(
            rx,
            notifier,
            state.clone(),
            cancel.clone(),
        ));
        cancel.cancel();
        handle.await.unwrap();

        // The sender is still alive, so only cancellation ended the loop.
        drop(tx);
        assert_eq!(state.stats.passes_run.load(Ordering::Relaxed), 0);
    }
}
