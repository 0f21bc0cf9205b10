//! Gas price snapshots and their shared publication point.

use crate::Category;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One gas price recommendation from the feed, in Gwei.
///
/// Snapshots are never edited in place: each feed update produces a new
/// value which replaces the previous one in [`LatestGasPrice`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GasPrice {
    pub fastest: f64,
    pub fast: f64,
    pub average: f64,
    #[serde(rename = "safeLow")]
    pub safe_low: f64,
}

impl GasPrice {
    pub fn new(fastest: f64, fast: f64, average: f64, safe_low: f64) -> Self {
        Self {
            fastest,
            fast,
            average,
            safe_low,
        }
    }

    /// Price for one category.
    #[inline]
    pub fn value(&self, category: Category) -> f64 {
        match category {
            Category::Fastest => self.fastest,
            Category::Fast => self.fast,
            Category::Average => self.average,
            Category::SafeLow => self.safe_low,
        }
    }

    /// True when every tier is a finite, non-negative number.
    pub fn is_valid(&self) -> bool {
        Category::ALL
            .into_iter()
            .map(|c| self.value(c))
            .all(|v| v.is_finite() && v >= 0.0)
    }

    /// Multi-line form sent in reply to `/latest`.
    pub fn sendable(&self) -> String {
        format!(
            "Fastest : {:.2} Gwei 🚀\nFast : {:.2} Gwei\nAverage : {:.2} Gwei\nSafeLow : {:.2} Gwei 🐢",
            self.fastest, self.fast, self.average, self.safe_low
        )
    }
}

impl std::fmt::Display for GasPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fastest : {:.2} Gwei | fast : {:.2} Gwei | average : {:.2} Gwei | safeLow : {:.2} Gwei",
            self.fastest, self.fast, self.average, self.safe_low
        )
    }
}

/// Latest published snapshot.
///
/// Single writer (the feed ingestor), many readers. `store` swaps the whole
/// snapshot pointer, so a reader holds either the previous or the next
/// reading and never a mix of both.
#[derive(Debug, Default)]
pub struct LatestGasPrice {
    current: ArcSwapOption<GasPrice>,
}

impl LatestGasPrice {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// Publish a new snapshot.
    pub fn store(&self, price: GasPrice) {
        self.current.store(Some(Arc::new(price)));
    }

    /// The most recent snapshot, if any has been published.
    pub fn load(&self) -> Option<Arc<GasPrice>> {
        self.current.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_feed_payload() {
        let json = r#"{"fast":100.0,"fastest":120.0,"safeLow":50.0,"average":80.0}"#;
        let price: GasPrice = serde_json::from_str(json).unwrap();
        assert_eq!(price, GasPrice::new(120.0, 100.0, 80.0, 50.0));
    }

    #[test]
    fn test_deserialize_rejects_missing_field() {
        let json = r#"{"fast":100.0,"fastest":120.0,"average":80.0}"#;
        assert!(serde_json::from_str::<GasPrice>(json).is_err());
    }

    #[test]
    fn test_value_by_category() {
        let price = GasPrice::new(4.0, 3.0, 2.0, 1.0);
        assert_eq!(price.value(Category::Fastest), 4.0);
        assert_eq!(price.value(Category::Fast), 3.0);
        assert_eq!(price.value(Category::Average), 2.0);
        assert_eq!(price.value(Category::SafeLow), 1.0);
    }

    #[test]
    fn test_is_valid() {
        assert!(GasPrice::new(4.0, 3.0, 2.0, 0.0).is_valid());
        assert!(!GasPrice::new(4.0, -3.0, 2.0, 1.0).is_valid());
        assert!(!GasPrice::new(f64::NAN, 3.0, 2.0, 1.0).is_valid());
    }

    #[test]
    fn test_display() {
        let price = GasPrice::new(120.0, 100.0, 80.0, 50.5);
        assert_eq!(
            price.to_string(),
            "fastest : 120.00 Gwei | fast : 100.00 Gwei | average : 80.00 Gwei | safeLow : 50.50 Gwei"
        );
        assert!(price.sendable().starts_with("Fastest : 120.00 Gwei"));
        assert!(price.sendable().contains("SafeLow : 50.50 Gwei"));
    }

    #[test]
    fn test_latest_store_replaces_whole_snapshot() {
        let latest = LatestGasPrice::new();
        assert!(latest.is_empty());
        assert!(latest.load().is_none());

        latest.store(GasPrice::new(4.0, 3.0, 2.0, 1.0));
        let first = latest.load().unwrap();

        latest.store(GasPrice::new(40.0, 30.0, 20.0, 10.0));
        let second = latest.load().unwrap();

        // Readers keep the snapshot they loaded.
        assert_eq!(*first, GasPrice::new(4.0, 3.0, 2.0, 1.0));
        assert_eq!(*second, GasPrice::new(40.0, 30.0, 20.0, 10.0));
    }
}
