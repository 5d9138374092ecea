//! Device location port.

use std::time::Duration;

use async_trait::async_trait;
use rallypoint_core::Position;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location services unavailable: {0}")]
    Unavailable(String),
    #[error("no position fix")]
    NoFix,
}

/// Platform location services.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> Permission;

    /// Current position. Implementations should give up after `timeout`;
    /// the gate enforces it regardless.
    async fn current_position(&self, timeout: Duration) -> Result<Position, LocationError>;
}

/// A provider that always reports the same position, or no fix at all.
///
/// Used by the CLI, where the position comes from flags.
#[derive(Debug, Clone, Default)]
pub struct FixedLocation {
    position: Option<Position>,
}

impl FixedLocation {
    pub fn at(position: Position) -> Self {
        Self {
            position: Some(position),
        }
    }

    /// Permission granted but never a fix; the gate falls back.
    pub fn unavailable() -> Self {
        Self { position: None }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn current_position(&self, _timeout: Duration) -> Result<Position, LocationError> {
        self.position.ok_or(LocationError::NoFix)
    }
}
