//! Telegram bot handlers.

use crate::notifier::{Transport, TransportError};
use crate::registry::{RegistryError, SubscribeOutcome, SubscriberRegistry};
use crate::subscriber::{LifecycleState, Subscriber};
use async_trait::async_trait;
use gasbot_core::{Category, Criterion, LatestGasPrice, Operator, Recipient, SubscriberId};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{Chat, InlineKeyboardButton, InlineKeyboardMarkup, User};
use teloxide::update_listeners::UpdateListener;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
}

/// Malformed `/subscribe` arguments.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("bad payload received")]
    BadPayload,
    #[error("bad threshold received")]
    BadThreshold,
}

const SUBSCRIBE_USAGE: &str =
    "Usage: /subscribe <category> <operator> <threshold>\nExample: /subscribe fast < 30";

const WIZARD_PRIVATE_ONLY: &str =
    "Step by step setup only works in a private chat with the bot. Here, use /subscribe.";

/// Pause between shutdown requests while the dispatcher is still starting.
const SHUTDOWN_RETRY: Duration = Duration::from_millis(50);

/// Bot commands.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Show the latest gas price")]
    Latest,
    #[command(description = "Subscribe to alerts. Usage: /subscribe fast < 30")]
    Subscribe(String),
    #[command(description = "Stop receiving alerts")]
    Unsubscribe,
    #[command(description = "Show your subscription")]
    Status,
    #[command(description = "Set up a subscription step by step")]
    Configure,
    #[command(description = "Abandon an unfinished setup")]
    Cancel,
}

/// Split `/subscribe` arguments into category, operator and threshold.
///
/// Only the shape is checked here; the registry validates the values.
pub fn parse_subscription_payload(payload: &str) -> Result<(&str, &str, f64), CommandError> {
    let parts: Vec<&str> = payload.split_whitespace().collect();
    let [category, operator, threshold] = parts.as_slice() else {
        return Err(CommandError::BadPayload);
    };
    let threshold = threshold
        .parse::<f64>()
        .map_err(|_| CommandError::BadThreshold)?;
    Ok((*category, *operator, threshold))
}

/// Inline button payloads used by the `/configure` wizard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallbackAction {
    Category(Category),
    Operator(Operator),
    Confirm,
    Cancel,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Category(c) => format!("cat:{}", c.as_str()),
            CallbackAction::Operator(o) => format!("op:{}", o.symbol()),
            CallbackAction::Confirm => "confirm".to_string(),
            CallbackAction::Cancel => "cancel".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "confirm" => Some(CallbackAction::Confirm),
            "cancel" => Some(CallbackAction::Cancel),
            _ => {
                if let Some(category) = data.strip_prefix("cat:") {
                    category.parse().ok().map(CallbackAction::Category)
                } else if let Some(operator) = data.strip_prefix("op:") {
                    operator.parse().ok().map(CallbackAction::Operator)
                } else {
                    None
                }
            }
        }
    }
}

fn category_keyboard() -> InlineKeyboardMarkup {
    let row = Category::ALL
        .into_iter()
        .map(|c| InlineKeyboardButton::callback(c.as_str(), CallbackAction::Category(c).encode()))
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(vec![row])
}

fn operator_keyboard() -> InlineKeyboardMarkup {
    let row = Operator::ALL
        .into_iter()
        .map(|o| InlineKeyboardButton::callback(o.symbol(), CallbackAction::Operator(o).encode()))
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(vec![row])
}

fn confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Confirm", CallbackAction::Confirm.encode()),
        InlineKeyboardButton::callback("Cancel", CallbackAction::Cancel.encode()),
    ]])
}

/// Subscriber identity for a chat: the username when there is one.
fn chat_recipient(chat: &Chat) -> Recipient {
    let id = match chat.username() {
        Some(username) => SubscriberId::new(username),
        None => SubscriberId::new(chat.id.0.to_string()),
    };
    Recipient::new(id, chat.id.0)
}

/// Subscriber identity for a button press. Replies go to the user's
/// private chat, which shares the user's id.
fn user_recipient(user: &User) -> Recipient {
    let id = match user.username.as_deref() {
        Some(username) => SubscriberId::new(username),
        None => SubscriberId::new(user.id.0.to_string()),
    };
    Recipient::new(id, ChatId::from(user.id).0)
}

/// Wizard identity for a chat. Button presses are keyed on the user, so
/// the wizard is limited to private chats, where the chat is the user.
fn wizard_recipient(chat: &Chat) -> Option<Recipient> {
    chat.is_private().then(|| chat_recipient(chat))
}

/// Ask the dispatcher to stop, retrying while it has not started yet.
async fn request_shutdown(mut try_shutdown: impl FnMut() -> bool, retry: Duration) {
    while !try_shutdown() {
        debug!("Dispatcher not running yet, retrying shutdown");
        tokio::time::sleep(retry).await;
    }
}

fn subscribed_text(outcome: SubscribeOutcome, criterion: &Criterion) -> String {
    match outcome {
        SubscribeOutcome::Created => format!("Subscribed ✅\nAlert when {}", criterion),
        SubscribeOutcome::Updated => format!("Subscription updated ✅\nAlert when {}", criterion),
    }
}

fn status_text(subscriber: Option<&Subscriber>) -> String {
    let Some(subscriber) = subscriber else {
        return RegistryError::NotSubscribed.to_string();
    };
    match subscriber.active_criterion() {
        Some(criterion) => format!("Subscribed: alert when {}", criterion),
        None => format!(
            "Setup in progress ({}). Continue with the buttons or /cancel.",
            subscriber.state
        ),
    }
}

/// Delivers notifications as plain Telegram messages.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, recipient: &Recipient, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(ChatId(recipient.chat_id), text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Delivery(e.to_string()))
    }
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
    registry: Arc<SubscriberRegistry>,
    latest: Arc<LatestGasPrice>,
}

impl TelegramBot {
    pub fn new(token: &str, registry: Arc<SubscriberRegistry>, latest: Arc<LatestGasPrice>) -> Self {
        Self {
            bot: Bot::new(token),
            registry,
            latest,
        }
    }

    /// Get the underlying bot for sending messages.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Publish the command list shown in the Telegram client menu.
    pub async fn register_commands(&self) -> Result<(), TelegramError> {
        self.bot.set_my_commands(Command::bot_commands()).await?;
        Ok(())
    }

    /// Receive updates by long polling until `cancel` fires.
    pub async fn run_polling(self: Arc<Self>, cancel: CancellationToken) {
        let listener = teloxide::update_listeners::polling_default(self.bot.clone()).await;
        self.run_with_listener(listener, cancel).await;
    }

    /// Dispatch updates from `listener` until `cancel` fires.
    pub async fn run_with_listener<L>(self: Arc<Self>, listener: L, cancel: CancellationToken)
    where
        L: UpdateListener + Send,
        L::Err: std::fmt::Debug,
    {
        if cancel.is_cancelled() {
            return;
        }

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), Arc::clone(&self).schema())
            .default_handler(|_update| async {})
            .error_handler(LoggingErrorHandler::with_custom_text(
                "Error while handling Telegram update",
            ))
            .build();

        let shutdown = dispatcher.shutdown_token();
        let watcher = tokio::spawn(async move {
            cancel.cancelled().await;
            request_shutdown(|| shutdown.shutdown().is_ok(), SHUTDOWN_RETRY).await;
        });

        info!("Telegram bot started");
        dispatcher
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("Telegram update listener error"),
            )
            .await;
        watcher.abort();
        info!("Telegram bot stopped");
    }

    fn schema(self: Arc<Self>) -> UpdateHandler<TelegramError> {
        let commands = {
            let this = Arc::clone(&self);
            Update::filter_message().filter_command::<Command>().endpoint(
                move |bot: Bot, msg: Message, cmd: Command| {
                    let this = Arc::clone(&this);
                    async move { this.handle_command(bot, msg, cmd).await }
                },
            )
        };

        let texts = {
            let this = Arc::clone(&self);
            Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
                let this = Arc::clone(&this);
                async move { this.handle_text(bot, msg).await }
            })
        };

        let callbacks = Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
            let this = Arc::clone(&self);
            async move { this.handle_callback(bot, q).await }
        });

        dptree::entry()
            .branch(commands)
            .branch(texts)
            .branch(callbacks)
    }

    async fn handle_command(&self, bot: Bot, msg: Message, cmd: Command) -> Result<(), TelegramError> {
        let chat_id = msg.chat.id;
        let recipient = chat_recipient(&msg.chat);
        debug!(subscriber = %recipient.id, command = ?cmd, "Received command");

        match cmd {
            Command::Start => {
                let text = format!(
                    "Welcome to the gas price alert bot ⛽\n\n\
                     Get a message when the Ethereum gas price crosses your threshold.\n\
                     Categories: fastest, fast, average, safeLow\n\
                     Operators: <, >, <=, >=, ==\n\n\
                     {}\n\nOr use /configure to set one up step by step.",
                    SUBSCRIBE_USAGE
                );
                bot.send_message(chat_id, text).await?;
            }

            Command::Help => {
                bot.send_message(chat_id, Command::descriptions().to_string())
                    .await?;
            }

            Command::Latest => {
                let text = match self.latest.load() {
                    Some(price) => price.sendable(),
                    None => "Gas price not available yet, try again shortly.".to_string(),
                };
                bot.send_message(chat_id, text).await?;
            }

            Command::Subscribe(payload) => {
                let text = match parse_subscription_payload(&payload) {
                    Err(e @ CommandError::BadPayload) => format!("{}\n{}", e, SUBSCRIBE_USAGE),
                    Err(e) => e.to_string(),
                    Ok((category, operator, threshold)) => {
                        match Criterion::parse(category, operator, threshold) {
                            Ok(criterion) => {
                                let outcome = self
                                    .registry
                                    .subscribe_criterion(recipient, criterion)
                                    .await;
                                subscribed_text(outcome, &criterion)
                            }
                            Err(e) => RegistryError::from(e).to_string(),
                        }
                    }
                };
                bot.send_message(chat_id, text).await?;
            }

            Command::Unsubscribe => {
                let text = match self.registry.unsubscribe(&recipient.id).await {
                    Ok(_) => "Unsubscribed, you will not receive alerts anymore.".to_string(),
                    Err(e) => e.to_string(),
                };
                bot.send_message(chat_id, text).await?;
            }

            Command::Status => {
                let subscriber = self.registry.get(&recipient.id).await;
                bot.send_message(chat_id, status_text(subscriber.as_ref()))
                    .await?;
            }

            Command::Configure => {
                if wizard_recipient(&msg.chat).is_none() {
                    bot.send_message(chat_id, WIZARD_PRIVATE_ONLY).await?;
                } else if self.registry.contains(&recipient.id).await {
                    bot.send_message(chat_id, RegistryError::AlreadySubscribed.to_string())
                        .await?;
                } else {
                    bot.send_message(chat_id, "Pick a category:")
                        .reply_markup(category_keyboard())
                        .await?;
                }
            }

            Command::Cancel => {
                let text = match self.registry.cancel_interactive(&recipient.id).await {
                    Ok(()) => "Setup cancelled.".to_string(),
                    Err(e) => e.to_string(),
                };
                bot.send_message(chat_id, text).await?;
            }
        }

        Ok(())
    }

    /// Plain messages: the threshold step of the wizard.
    async fn handle_text(&self, bot: Bot, msg: Message) -> Result<(), TelegramError> {
        let Some(text) = msg.text() else {
            return Ok(());
        };
        let chat_id = msg.chat.id;

        if text.starts_with('/') {
            bot.send_message(chat_id, "Unknown command. Use /help to see available commands.")
                .await?;
            return Ok(());
        }

        let Some(recipient) = wizard_recipient(&msg.chat) else {
            return Ok(());
        };
        let awaiting_threshold = matches!(
            self.registry.get(&recipient.id).await,
            Some(Subscriber { state: LifecycleState::OperatorChosen, criterion, .. })
                if criterion.threshold.is_none()
        );
        if !awaiting_threshold {
            bot.send_message(chat_id, "Use /help to see available commands.")
                .await?;
            return Ok(());
        }

        let Ok(threshold) = text.trim().parse::<f64>() else {
            bot.send_message(chat_id, CommandError::BadThreshold.to_string())
                .await?;
            return Ok(());
        };

        match self.registry.set_threshold(&recipient.id, threshold).await {
            Ok(()) => {
                bot.send_message(chat_id, format!("Threshold set to {:.2} Gwei. Confirm?", threshold))
                    .reply_markup(confirm_keyboard())
                    .await?;
            }
            Err(e) => {
                bot.send_message(chat_id, e.to_string()).await?;
            }
        }
        Ok(())
    }

    async fn handle_callback(&self, bot: Bot, q: CallbackQuery) -> Result<(), TelegramError> {
        bot.answer_callback_query(q.id.clone()).await?;

        let recipient = user_recipient(&q.from);
        let chat_id = ChatId(recipient.chat_id);
        let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
            warn!(subscriber = %recipient.id, data = ?q.data, "Unknown callback data");
            return Ok(());
        };
        debug!(subscriber = %recipient.id, ?action, "Received button press");

        let id = recipient.id.clone();
        match action {
            CallbackAction::Category(category) => {
                match self.registry.begin_interactive(recipient, category.as_str()).await {
                    Ok(()) => {
                        bot.send_message(chat_id, format!("Category: {}\nPick an operator:", category))
                            .reply_markup(operator_keyboard())
                            .await?;
                    }
                    Err(e) => {
                        bot.send_message(chat_id, e.to_string()).await?;
                    }
                }
            }

            CallbackAction::Operator(operator) => {
                let text = match self.registry.set_operator(&id, operator.symbol()).await {
                    Ok(()) => format!("Operator: {}\nNow send the threshold in Gwei (at least 1).", operator),
                    Err(e) => e.to_string(),
                };
                bot.send_message(chat_id, text).await?;
            }

            CallbackAction::Confirm => {
                let text = match self.registry.confirm(&id).await {
                    Ok(criterion) => subscribed_text(SubscribeOutcome::Created, &criterion),
                    Err(e) => e.to_string(),
                };
                bot.send_message(chat_id, text).await?;
            }

            CallbackAction::Cancel => {
                let text = match self.registry.cancel_interactive(&id).await {
                    Ok(()) => "Setup cancelled.".to_string(),
                    Err(e) => e.to_string(),
                };
                bot.send_message(chat_id, text).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasbot_core::PartialCriterion;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_subscription_payload() {
        assert_eq!(
            parse_subscription_payload("fastest < 150"),
            Ok(("fastest", "<", 150.0))
        );
        assert_eq!(
            parse_subscription_payload("  safeLow   >=  20.5 "),
            Ok(("safeLow", ">=", 20.5))
        );
    }

    #[test]
    fn test_parse_subscription_payload_errors() {
        assert_eq!(parse_subscription_payload(""), Err(CommandError::BadPayload));
        assert_eq!(parse_subscription_payload("fast <"), Err(CommandError::BadPayload));
        assert_eq!(
            parse_subscription_payload("fast < 30 extra"),
            Err(CommandError::BadPayload)
        );
        assert_eq!(
            parse_subscription_payload("fast < thirty"),
            Err(CommandError::BadThreshold)
        );
        assert_eq!(CommandError::BadPayload.to_string(), "bad payload received");
        assert_eq!(CommandError::BadThreshold.to_string(), "bad threshold received");
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/latest", "gasbot").ok(), Some(Command::Latest));
        assert_eq!(
            Command::parse("/subscribe fast < 30", "gasbot").ok(),
            Some(Command::Subscribe("fast < 30".to_string()))
        );
        assert_eq!(
            Command::parse("/configure", "gasbot").ok(),
            Some(Command::Configure)
        );
        assert!(Command::parse("/premium 50", "gasbot").is_err());
    }

    #[test]
    fn test_callback_action_round_trip() {
        let actions = [
            CallbackAction::Category(Category::SafeLow),
            CallbackAction::Operator(Operator::Le),
            CallbackAction::Confirm,
            CallbackAction::Cancel,
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
        }
        assert_eq!(CallbackAction::Category(Category::SafeLow).encode(), "cat:safeLow");
        assert_eq!(CallbackAction::Operator(Operator::Le).encode(), "op:<=");
    }

    #[test]
    fn test_callback_action_rejects_unknown_data() {
        assert_eq!(CallbackAction::parse("cat:slow"), None);
        assert_eq!(CallbackAction::parse("op:=<"), None);
        assert_eq!(CallbackAction::parse("subscribe"), None);
    }

    #[test]
    fn test_keyboards_cover_all_choices() {
        assert_eq!(category_keyboard().inline_keyboard[0].len(), Category::ALL.len());
        assert_eq!(operator_keyboard().inline_keyboard[0].len(), Operator::ALL.len());
        assert_eq!(confirm_keyboard().inline_keyboard[0].len(), 2);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(status_text(None), "not subscribed yet");

        let criterion = Criterion::parse("fast", "<", 30.0).unwrap();
        let confirmed = Subscriber::confirmed(Recipient::new("alice", 1), criterion);
        assert_eq!(
            status_text(Some(&confirmed)),
            "Subscribed: alert when fast < 30.00 Gwei"
        );

        let pending = Subscriber {
            recipient: Recipient::new("alice", 1),
            criterion: PartialCriterion::with_category(Category::Fast),
            state: LifecycleState::CategoryChosen,
        };
        assert_eq!(
            status_text(Some(&pending)),
            "Setup in progress (category chosen). Continue with the buttons or /cancel."
        );
    }

    fn chat(json: serde_json::Value) -> Chat {
        serde_json::from_value(json).unwrap()
    }

    fn user(json: serde_json::Value) -> User {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_wizard_identity_matches_button_presses() {
        let private = chat(serde_json::json!({
            "id": 42, "type": "private", "username": "alice", "first_name": "Alice"
        }));
        let alice = user(serde_json::json!({
            "id": 42, "is_bot": false, "first_name": "Alice", "username": "alice"
        }));
        assert_eq!(wizard_recipient(&private), Some(user_recipient(&alice)));
        assert_eq!(wizard_recipient(&private), Some(Recipient::new("alice", 42)));

        let anonymous = chat(serde_json::json!({
            "id": 7, "type": "private", "first_name": "Bob"
        }));
        let bob = user(serde_json::json!({ "id": 7, "is_bot": false, "first_name": "Bob" }));
        assert_eq!(wizard_recipient(&anonymous), Some(user_recipient(&bob)));
    }

    #[test]
    fn test_wizard_refused_in_group_chats() {
        let group = chat(serde_json::json!({
            "id": -1234, "type": "group", "title": "gas watchers"
        }));
        assert_eq!(wizard_recipient(&group), None);
        // One-shot commands still key on the group chat.
        assert_eq!(chat_recipient(&group), Recipient::new("-1234", -1234));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_retried_until_dispatcher_runs() {
        let mut attempts = 0;
        request_shutdown(
            || {
                attempts += 1;
                attempts > 3
            },
            SHUTDOWN_RETRY,
        )
        .await;
        assert_eq!(attempts, 4);
    }

    #[test]
    fn test_subscribed_text() {
        let criterion = Criterion::parse("safeLow", ">=", 20.0).unwrap();
        assert_eq!(
            subscribed_text(SubscribeOutcome::Updated, &criterion),
            "Subscription updated ✅\nAlert when safeLow >= 20.00 Gwei"
        );
    }
}
