//! Map markers: the closed set of things the live map can show.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::{RecordId, ReportingUser};
use crate::timestamp;

/// Fixed id of the single registered-address marker.
pub const ADDRESS_MARKER_ID: &str = "user-address";

/// Marker category. Partitions every marker set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Someone asked for help.
    Help,
    /// Someone reported themselves safe.
    Safe,
    /// A fixed assembly area.
    Area,
    /// The user's own registered address.
    Address,
}

impl Category {
    pub const ALL: [Category; 4] = [Self::Help, Self::Safe, Self::Area, Self::Address];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Safe => "safe",
            Self::Area => "area",
            Self::Address => "address",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category {0:?} (expected all, help, safe, area or address)")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "help" => Ok(Self::Help),
            "safe" => Ok(Self::Safe),
            "area" => Ok(Self::Area),
            "address" => Ok(Self::Address),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A help call or safe-status report placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMarker {
    pub id: RecordId,
    #[serde(flatten)]
    pub coordinates: Coordinates,
    pub message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub user: Option<ReportingUser>,
}

/// An assembly area. Has no message, timestamp or user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaMarker {
    pub id: RecordId,
    #[serde(flatten)]
    pub coordinates: Coordinates,
}

/// The user's registered address with its display label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressMarker {
    pub id: RecordId,
    #[serde(flatten)]
    pub coordinates: Coordinates,
    pub message: String,
}

/// One item on the map, tagged with exactly one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum MapMarker {
    Help(EventMarker),
    Safe(EventMarker),
    Area(AreaMarker),
    Address(AddressMarker),
}

/// Rendering key: ids are only unique within a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerKey {
    pub category: Category,
    pub id: RecordId,
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.category, self.id)
    }
}

impl MapMarker {
    pub fn category(&self) -> Category {
        match self {
            Self::Help(_) => Category::Help,
            Self::Safe(_) => Category::Safe,
            Self::Area(_) => Category::Area,
            Self::Address(_) => Category::Address,
        }
    }

    pub fn id(&self) -> &RecordId {
        match self {
            Self::Help(m) | Self::Safe(m) => &m.id,
            Self::Area(m) => &m.id,
            Self::Address(m) => &m.id,
        }
    }

    pub fn key(&self) -> MarkerKey {
        MarkerKey {
            category: self.category(),
            id: self.id().clone(),
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        match self {
            Self::Help(m) | Self::Safe(m) => m.coordinates,
            Self::Area(m) => m.coordinates,
            Self::Address(m) => m.coordinates,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates().latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates().longitude
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Help(m) | Self::Safe(m) => m.message.as_deref(),
            Self::Address(m) => Some(&m.message),
            Self::Area(_) => None,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Help(m) | Self::Safe(m) => m.created_at,
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&ReportingUser> {
        match self {
            Self::Help(m) | Self::Safe(m) => m.user.as_ref(),
            _ => None,
        }
    }

    /// Minutes since the event was reported, evaluated against `now`.
    ///
    /// Not stored: callers pass the render-time clock so a re-render without
    /// a new fetch shows a growing value.
    pub fn minutes_elapsed(&self, now: DateTime<Utc>) -> Option<i64> {
        self.created_at()
            .map(|created| timestamp::minutes_elapsed(created, now))
    }
}
