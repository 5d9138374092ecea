//! Session gate: no credential or no usable position, no sync.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rallypoint_core::{Credential, Position};
use rallypoint_store::{
    PositionCache, SESSION_KEYS, SESSION_STARTED_KEY, SessionStore, StoreError, TOKEN_KEY,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::location::{LocationProvider, Permission};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("no session credential, sign-in required")]
    Unauthenticated,
    #[error("location permission denied and no fallback position stored")]
    LocationPermissionDenied,
    #[error("session store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Where the position of a resolved session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    /// Fresh fix from the location provider.
    Live,
    /// Last persisted live fix.
    Cached,
    /// Configured default coordinate.
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSession {
    pub credential: Credential,
    pub position: Position,
    pub position_source: PositionSource,
    /// Permission was refused and a cached position stands in.
    pub permission_denied: bool,
}

pub struct SessionGate {
    sessions: Arc<dyn SessionStore>,
    location: Arc<dyn LocationProvider>,
    positions: Arc<dyn PositionCache>,
    default_position: Position,
    position_timeout: Duration,
    session_timeout: Option<Duration>,
}

impl SessionGate {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        location: Arc<dyn LocationProvider>,
        positions: Arc<dyn PositionCache>,
        default_position: Position,
        position_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            location,
            positions,
            default_position,
            position_timeout,
            session_timeout: None,
        }
    }

    /// Sign the user out once `timeout` has passed since the time stored
    /// under [`SESSION_STARTED_KEY`]. Sessions without a start time never
    /// time out.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Resolve the credential and a position for this cycle.
    ///
    /// Fails before touching location services when there is no credential
    /// or the session has timed out. A timed-out session is cleared from the
    /// store; otherwise the only write is persisting a successful live fix.
    pub async fn resolve_session(&self) -> Result<ResolvedSession, GateError> {
        let credential = self
            .sessions
            .get(TOKEN_KEY)?
            .and_then(Credential::new)
            .ok_or(GateError::Unauthenticated)?;

        if self.session_timed_out()? {
            self.sessions.remove(SESSION_KEYS)?;
            info!("session timed out, signed out");
            return Err(GateError::Unauthenticated);
        }

        let permission =
            match tokio::time::timeout(self.position_timeout, self.location.request_permission())
                .await
            {
                Ok(permission) => permission,
                Err(_) => {
                    warn!(timeout = ?self.position_timeout, "permission prompt timed out");
                    Permission::Denied
                }
            };

        if permission == Permission::Denied {
            return match self.cached_position() {
                Some(position) => {
                    warn!("location permission denied, using cached position");
                    Ok(ResolvedSession {
                        credential,
                        position,
                        position_source: PositionSource::Cached,
                        permission_denied: true,
                    })
                }
                None => Err(GateError::LocationPermissionDenied),
            };
        }

        let (position, position_source) = self.acquire_position().await;
        debug!(?position_source, lat = position.latitude, lon = position.longitude, "session resolved");
        Ok(ResolvedSession {
            credential,
            position,
            position_source,
            permission_denied: false,
        })
    }

    async fn acquire_position(&self) -> (Position, PositionSource) {
        let live = tokio::time::timeout(
            self.position_timeout,
            self.location.current_position(self.position_timeout),
        )
        .await;

        match live {
            Ok(Ok(position)) if position.is_valid() => {
                if let Err(e) = self.positions.save(&position) {
                    warn!(error = %e, "could not persist fallback position");
                }
                return (position, PositionSource::Live);
            }
            Ok(Ok(position)) => warn!(?position, "provider returned an invalid position"),
            Ok(Err(e)) => warn!(error = %e, "live position unavailable"),
            Err(_) => warn!(timeout = ?self.position_timeout, "live position timed out"),
        }

        match self.cached_position() {
            Some(position) => (position, PositionSource::Cached),
            None => {
                info!("no cached position, using configured default");
                (self.default_position, PositionSource::Default)
            }
        }
    }

    fn session_timed_out(&self) -> Result<bool, GateError> {
        let Some(timeout) = self.session_timeout else {
            return Ok(false);
        };
        let Some(raw) = self.sessions.get(SESSION_STARTED_KEY)? else {
            return Ok(false);
        };
        let started = match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(started) => started.with_timezone(&Utc),
            Err(e) => {
                warn!(error = %e, raw = %raw, "unreadable session start time, ignoring");
                return Ok(false);
            }
        };
        // A start time in the future gives a negative age, which never expires.
        let age = Utc::now().signed_duration_since(started);
        Ok(age.to_std().is_ok_and(|age| age >= timeout))
    }

    fn cached_position(&self) -> Option<Position> {
        match self.positions.load() {
            Ok(position) => position,
            Err(e) => {
                warn!(error = %e, "could not read cached position");
                None
            }
        }
    }
}
