//! Gas price categories published by the feed.

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Transaction speed tier of a gas price recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Category {
    #[serde(rename = "fastest")]
    Fastest = 1,
    #[serde(rename = "fast")]
    Fast = 2,
    #[serde(rename = "average")]
    Average = 3,
    #[serde(rename = "safeLow")]
    SafeLow = 4,
}

impl Category {
    /// Every category, fastest first.
    pub const ALL: [Category; 4] = [
        Category::Fastest,
        Category::Fast,
        Category::Average,
        Category::SafeLow,
    ];

    /// Wire name, as used in feed payloads and bot commands.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Fastest => "fastest",
            Category::Fast => "fast",
            Category::Average => "average",
            Category::SafeLow => "safeLow",
        }
    }

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Category::Fastest),
            2 => Some(Category::Fast),
            3 => Some(Category::Average),
            4 => Some(Category::SafeLow),
            _ => None,
        }
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    /// Matching ignores ASCII case, so `safelow` and `SafeLow` both resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
