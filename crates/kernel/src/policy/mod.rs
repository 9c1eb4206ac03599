//! Publication policy evaluation.
//!
//! Decides, for a given instant, whether an entry is published, pinned or a
//! draft, and filters/orders entry lists accordingly.

mod evaluator;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use evaluator::{PolicyEvaluator, is_active};

/// Which entries a listing asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyFilter {
    Published,
    Draft,
    Pinned,
    /// No filtering.
    #[default]
    #[serde(alias = "all")]
    None,
}

impl FromStr for PolicyFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "published" => Ok(PolicyFilter::Published),
            "draft" => Ok(PolicyFilter::Draft),
            "pinned" => Ok(PolicyFilter::Pinned),
            "" | "all" | "none" => Ok(PolicyFilter::None),
            other => Err(format!("unknown filter '{other}'")),
        }
    }
}

/// Status label shown next to an entry in management views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pinned,
    Published,
    /// Publish window opens in the future.
    Scheduled,
    /// Publish window has closed.
    Expired,
    Draft,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Pinned => "Pinned",
            Status::Published => "Published",
            Status::Scheduled => "Scheduled",
            Status::Expired => "Expired",
            Status::Draft => "Draft",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of evaluating an entry at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Visibility {
    pub published: bool,
    pub pinned: bool,
    pub status: Status,
}

impl Visibility {
    pub fn is_draft(&self) -> bool {
        !self.published
    }

    /// Whether this visibility satisfies `filter`.
    pub fn matches(&self, filter: PolicyFilter) -> bool {
        match filter {
            PolicyFilter::Published => self.published,
            PolicyFilter::Draft => self.is_draft(),
            PolicyFilter::Pinned => self.pinned,
            PolicyFilter::None => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn filter_parses_query_values() {
        assert_eq!("published".parse::<PolicyFilter>().unwrap(), PolicyFilter::Published);
        assert_eq!("Draft".parse::<PolicyFilter>().unwrap(), PolicyFilter::Draft);
        assert_eq!("pinned".parse::<PolicyFilter>().unwrap(), PolicyFilter::Pinned);
        assert_eq!("all".parse::<PolicyFilter>().unwrap(), PolicyFilter::None);
        assert_eq!("".parse::<PolicyFilter>().unwrap(), PolicyFilter::None);
        assert!("archived".parse::<PolicyFilter>().is_err());
    }

    #[test]
    fn visibility_matches_filters() {
        let pinned = Visibility {
            published: true,
            pinned: true,
            status: Status::Pinned,
        };
        let draft = Visibility {
            published: false,
            pinned: false,
            status: Status::Draft,
        };

        assert!(pinned.matches(PolicyFilter::Published));
        assert!(pinned.matches(PolicyFilter::Pinned));
        assert!(!pinned.matches(PolicyFilter::Draft));
        assert!(draft.matches(PolicyFilter::Draft));
        assert!(!draft.matches(PolicyFilter::Published));
        assert!(draft.matches(PolicyFilter::None));
    }
}
