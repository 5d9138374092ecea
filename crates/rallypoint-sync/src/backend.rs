//! Backend port: the three per-user feeds behind the live map.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rallypoint_core::{Credential, RawEventRecord, UserAddress};
use thiserror::Error;

/// One backend source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    HelpCalls,
    SafeStatus,
    Address,
}

impl Feed {
    pub const ALL: [Feed; 3] = [Self::HelpCalls, Self::SafeStatus, Self::Address];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HelpCalls => "help-calls",
            Self::SafeStatus => "safe-status",
            Self::Address => "address",
        }
    }

    /// Request path relative to the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Self::HelpCalls => "/user/help-calls",
            Self::SafeStatus => "/user/safe-status",
            Self::Address => "/user/address",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{feed} rejected the credential (HTTP {status})")]
    Unauthorized { feed: Feed, status: u16 },
    #[error("{feed} returned HTTP {status}: {body}")]
    Status { feed: Feed, status: u16, body: String },
    #[error("{feed} request failed: {message}")]
    Transport { feed: Feed, message: String },
    #[error("{feed} returned an unreadable body: {message}")]
    Decode { feed: Feed, message: String },
    #[error("{feed} did not answer within {after:?}")]
    Timeout { feed: Feed, after: Duration },
}

impl BackendError {
    /// Classify a non-success status. 401 and 403 mean the session is gone.
    pub fn from_status(feed: Feed, status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { feed, status },
            _ => Self::Status { feed, status, body },
        }
    }

    pub fn feed(&self) -> Feed {
        match self {
            Self::Unauthorized { feed, .. }
            | Self::Status { feed, .. }
            | Self::Transport { feed, .. }
            | Self::Decode { feed, .. }
            | Self::Timeout { feed, .. } => *feed,
        }
    }
}

/// The authenticated map feeds.
#[async_trait]
pub trait MapBackend: Send + Sync {
    /// `GET /user/help-calls`
    async fn help_calls(&self, credential: &Credential)
    -> Result<Vec<RawEventRecord>, BackendError>;

    /// `GET /user/safe-status`
    async fn safe_statuses(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RawEventRecord>, BackendError>;

    /// `GET /user/address`. `Ok(None)` when the user has not set one (404).
    async fn user_address(&self, credential: &Credential)
    -> Result<Option<UserAddress>, BackendError>;
}
