//! Category filter for the map's filter bar.

use std::fmt;
use std::str::FromStr;

use crate::marker::{Category, MapMarker, ParseCategoryError};

/// Which markers to show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, marker: &MapMarker) -> bool {
        self.matches_category(marker.category())
    }

    pub fn matches_category(&self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => *only == category,
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(category) => category.fmt(f),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

/// Select the markers matching `filter`, preserving order.
///
/// Total: an empty result is a valid answer.
pub fn filter_markers(markers: &[MapMarker], filter: CategoryFilter) -> Vec<&MapMarker> {
    markers.iter().filter(|m| filter.matches(m)).collect()
}
