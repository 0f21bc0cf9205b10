//! In-memory subscriber registry.
//!
//! One map behind one reader-writer lock. Notification passes take the read
//! lock; every mutation takes the write lock. Entries are never persisted.

use crate::subscriber::{LifecycleState, Subscriber};
use gasbot_core::{
    validate_category, validate_operator, validate_threshold, Criterion, PartialCriterion,
    Recipient, SubscriberId, ValidationError,
};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("not subscribed yet")]
    NotSubscribed,
    #[error("already subscribed, /unsubscribe first")]
    AlreadySubscribed,
    #[error("no subscription setup in progress")]
    NotInProgress,
    #[error("choose a {0} first")]
    MissingStep(&'static str),
    #[error("{0} already chosen")]
    StepAlreadyDone(&'static str),
}

/// Result of a one-shot subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created,
    /// The id was already present; its criterion was replaced.
    Updated,
}

/// Registry of subscribers keyed by [`SubscriberId`].
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot subscription from raw input.
    ///
    /// Input is validated before the lock is taken; a rejected request
    /// leaves the registry untouched.
    pub async fn subscribe(
        &self,
        recipient: Recipient,
        category: &str,
        operator: &str,
        threshold: f64,
    ) -> Result<SubscribeOutcome, RegistryError> {
        let criterion = Criterion::parse(category, operator, threshold)?;
        Ok(self.subscribe_criterion(recipient, criterion).await)
    }

    /// One-shot subscription with an already validated criterion.
    ///
    /// Re-subscribing overwrites the previous criterion in place, whatever
    /// state the entry was in.
    pub async fn subscribe_criterion(
        &self,
        recipient: Recipient,
        criterion: Criterion,
    ) -> SubscribeOutcome {
        let mut subscribers = self.subscribers.write().await;

        if let Some(existing) = subscribers.get_mut(&recipient.id) {
            existing.recipient = recipient;
            existing.criterion = criterion.into();
            existing.state = LifecycleState::Confirmed;
            info!(subscriber = %existing.recipient.id, %criterion, "Subscription updated");
            return SubscribeOutcome::Updated;
        }

        info!(subscriber = %recipient.id, %criterion, "Subscribed");
        subscribers.insert(
            recipient.id.clone(),
            Subscriber::confirmed(recipient, criterion),
        );
        SubscribeOutcome::Created
    }

    /// Remove a subscriber in any state.
    pub async fn unsubscribe(&self, id: &SubscriberId) -> Result<Subscriber, RegistryError> {
        let removed = self
            .subscribers
            .write()
            .await
            .remove(id)
            .ok_or(RegistryError::NotSubscribed)?;
        info!(subscriber = %id, "Unsubscribed");
        Ok(removed)
    }

    /// Start the wizard with a chosen category.
    ///
    /// Fails when the id already has an entry, confirmed or not.
    pub async fn begin_interactive(
        &self,
        recipient: Recipient,
        category: &str,
    ) -> Result<(), RegistryError> {
        let category = validate_category(category)?;
        let mut subscribers = self.subscribers.write().await;

        if subscribers.contains_key(&recipient.id) {
            return Err(RegistryError::AlreadySubscribed);
        }

        debug!(subscriber = %recipient.id, %category, "Subscription setup started");
        subscribers.insert(
            recipient.id.clone(),
            Subscriber {
                recipient,
                criterion: PartialCriterion::with_category(category),
                state: LifecycleState::CategoryChosen,
            },
        );
        Ok(())
    }

    pub async fn set_operator(
        &self,
        id: &SubscriberId,
        operator: &str,
    ) -> Result<(), RegistryError> {
        let operator = validate_operator(operator)?;
        self.advance(id, |subscriber| {
            if subscriber.criterion.category.is_none() {
                return Err(RegistryError::MissingStep("category"));
            }
            if subscriber.criterion.operator.is_some() {
                return Err(RegistryError::StepAlreadyDone("operator"));
            }
            subscriber.criterion.operator = Some(operator);
            subscriber.state = LifecycleState::OperatorChosen;
            Ok(())
        })
        .await
    }

    pub async fn set_threshold(&self, id: &SubscriberId, threshold: f64) -> Result<(), RegistryError> {
        let threshold = validate_threshold(threshold)?;
        self.advance(id, |subscriber| {
            if subscriber.criterion.operator.is_none() {
                return Err(RegistryError::MissingStep("operator"));
            }
            if subscriber.criterion.threshold.is_some() {
                return Err(RegistryError::StepAlreadyDone("threshold"));
            }
            subscriber.criterion.threshold = Some(threshold);
            Ok(())
        })
        .await
    }

    /// Make a subscriber eligible for notification.
    ///
    /// An in-progress entry must have all three steps done. Confirming an
    /// already confirmed entry is a no-op.
    pub async fn confirm(&self, id: &SubscriberId) -> Result<Criterion, RegistryError> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers.get_mut(id).ok_or(RegistryError::NotSubscribed)?;

        let criterion = match subscriber.criterion {
            PartialCriterion { category: None, .. } => {
                return Err(RegistryError::MissingStep("category"))
            }
            PartialCriterion { operator: None, .. } => {
                return Err(RegistryError::MissingStep("operator"))
            }
            partial => partial
                .complete()
                .ok_or(RegistryError::MissingStep("threshold"))?,
        };

        if subscriber.state.is_in_progress() {
            subscriber.state = LifecycleState::Confirmed;
            info!(subscriber = %id, %criterion, "Subscribed");
        }
        Ok(criterion)
    }

    /// Drop an unfinished wizard. Confirmed subscriptions are left alone.
    pub async fn cancel_interactive(&self, id: &SubscriberId) -> Result<(), RegistryError> {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get(id) {
            None => Err(RegistryError::NotSubscribed),
            Some(subscriber) if !subscriber.state.is_in_progress() => {
                Err(RegistryError::NotInProgress)
            }
            Some(_) => {
                subscribers.remove(id);
                debug!(subscriber = %id, "Subscription setup cancelled");
                Ok(())
            }
        }
    }

    /// Apply one wizard step to an in-progress entry under the write lock.
    /// `step` must leave the entry untouched when it returns an error.
    async fn advance<F>(&self, id: &SubscriberId, step: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut Subscriber) -> Result<(), RegistryError>,
    {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers.get_mut(id).ok_or(RegistryError::NotSubscribed)?;
        if !subscriber.state.is_in_progress() {
            return Err(RegistryError::NotInProgress);
        }
        step(subscriber)
    }

    /// Confirmed subscribers and their criteria, copied out under a single
    /// read lock so the caller sees one consistent view.
    pub async fn ready(&self) -> Vec<(Recipient, Criterion)> {
        self.subscribers
            .read()
            .await
            .values()
            .filter_map(|s| s.active_criterion().map(|c| (s.recipient.clone(), c)))
            .collect()
    }

    pub async fn get(&self, id: &SubscriberId) -> Option<Subscriber> {
        self.subscribers.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}
