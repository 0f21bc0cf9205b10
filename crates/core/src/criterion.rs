//! Subscriber matching rules.

use crate::validate::{validate_category, validate_operator, validate_threshold};
use crate::{Category, GasPrice, Operator, ValidationError};

/// A complete rule: notify when `price(category) <operator> threshold`.
///
/// Construction goes through the shared validators, so a `Criterion` always
/// carries a threshold of at least [`crate::MIN_THRESHOLD`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criterion {
    category: Category,
    operator: Operator,
    threshold: f64,
}

impl Criterion {
    pub fn new(
        category: Category,
        operator: Operator,
        threshold: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            category,
            operator,
            threshold: validate_threshold(threshold)?,
        })
    }

    /// Build from raw user input, e.g. the arguments of `/subscribe`.
    pub fn parse(category: &str, operator: &str, threshold: f64) -> Result<Self, ValidationError> {
        Self::new(
            validate_category(category)?,
            validate_operator(operator)?,
            threshold,
        )
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    #[inline]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether `price` meets this rule.
    #[inline]
    pub fn satisfied_by(&self, price: &GasPrice) -> bool {
        self.operator
            .apply(price.value(self.category), self.threshold)
    }

    /// Message delivered to a subscriber whose rule matched `price`.
    pub fn render_notification(&self, price: &GasPrice) -> String {
        format!(
            "Hey 👋, gas price for `{}` tx has reached : {:.2} Gwei",
            self.category,
            price.value(self.category)
        )
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {:.2} Gwei",
            self.category, self.operator, self.threshold
        )
    }
}

/// A rule being assembled step by step by the interactive wizard.
///
/// Never evaluated against a snapshot until [`PartialCriterion::complete`]
/// yields a full [`Criterion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialCriterion {
    pub category: Option<Category>,
    pub operator: Option<Operator>,
    pub threshold: Option<f64>,
}

impl PartialCriterion {
    pub fn empty() -> Self {
        Self {
            category: None,
            operator: None,
            threshold: None,
        }
    }

    pub fn with_category(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Self::empty()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete().is_some()
    }

    pub fn complete(&self) -> Option<Criterion> {
        Criterion::new(self.category?, self.operator?, self.threshold?).ok()
    }
}

impl Default for PartialCriterion {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Criterion> for PartialCriterion {
    fn from(criterion: Criterion) -> Self {
        Self {
            category: Some(criterion.category),
            operator: Some(criterion.operator),
            threshold: Some(criterion.threshold),
        }
    }
}
