//! Subscriber state kept by the registry.

use gasbot_core::{Criterion, PartialCriterion, Recipient, SubscriberId};

/// Where a subscriber is in the step-by-step setup.
///
/// `/subscribe` jumps straight to `Confirmed`; the button-driven wizard
/// walks through the states in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Empty,
    CategoryChosen,
    OperatorChosen,
    Confirmed,
}

impl LifecycleState {
    /// Anything short of `Confirmed` is still being set up.
    #[inline]
    pub fn is_in_progress(self) -> bool {
        !matches!(self, LifecycleState::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Empty => "empty",
            LifecycleState::CategoryChosen => "category chosen",
            LifecycleState::OperatorChosen => "operator chosen",
            LifecycleState::Confirmed => "confirmed",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registry entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscriber {
    pub recipient: Recipient,
    pub criterion: PartialCriterion,
    pub state: LifecycleState,
}

impl Subscriber {
    /// A subscriber created by the one-shot path.
    pub fn confirmed(recipient: Recipient, criterion: Criterion) -> Self {
        Self {
            recipient,
            criterion: criterion.into(),
            state: LifecycleState::Confirmed,
        }
    }

    #[inline]
    pub fn id(&self) -> &SubscriberId {
        &self.recipient.id
    }

    /// The rule to evaluate, present only once confirmed and complete.
    pub fn active_criterion(&self) -> Option<Criterion> {
        if self.state.is_in_progress() {
            return None;
        }
        self.criterion.complete()
    }
}
