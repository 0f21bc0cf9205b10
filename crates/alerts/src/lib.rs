//! Gas price alerts.
//!
//! This crate provides:
//! - The in-memory subscriber registry and its setup lifecycle
//! - Notification passes over the registry for each new snapshot
//! - Telegram bot integration for commands and delivery

pub mod notifier;
pub mod registry;
pub mod subscriber;
pub mod telegram;

pub use notifier::{Notifier, NotifierConfig, PassReport, Transport, TransportError, TriggerMode};
pub use registry::{RegistryError, SubscribeOutcome, SubscriberRegistry};
pub use subscriber::{LifecycleState, Subscriber};
pub use telegram::{CommandError, TelegramBot, TelegramError, TelegramTransport};
