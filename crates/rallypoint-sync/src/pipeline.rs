//! One sync cycle: gate, fetch, merge.

use chrono::{DateTime, FixedOffset, Utc};
use rallypoint_core::{MapMarker, MergeError, Position, merge};
use thiserror::Error;
use tracing::{info, warn};

use crate::fetcher::{EventFetcher, FetchError, SessionExpired};
use crate::gate::{GateError, PositionSource, SessionGate};

/// The marker set a single successful cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub markers: Vec<MapMarker>,
    /// Records dropped during merge.
    pub rejected: Vec<MergeError>,
    /// Feeds that failed this cycle; their markers are absent.
    pub errors: Vec<FetchError>,
    pub position: Position,
    pub position_source: PositionSource,
    pub permission_denied: bool,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Fresh(Snapshot),
    /// Every network feed failed. The previous snapshot should stay up.
    Stale { errors: Vec<FetchError> },
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    SessionExpired(#[from] SessionExpired),
}

impl CycleError {
    /// The user has to sign in again before anything else can happen.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::Gate(GateError::Unauthenticated) | Self::SessionExpired(_)
        )
    }
}

pub struct SyncPipeline {
    gate: SessionGate,
    fetcher: EventFetcher,
    backend_offset: FixedOffset,
}

impl SyncPipeline {
    /// `backend_offset` is the UTC offset of the backend's clock, applied to
    /// timestamps the backend sends without a zone.
    pub fn new(gate: SessionGate, fetcher: EventFetcher, backend_offset: FixedOffset) -> Self {
        Self {
            gate,
            fetcher,
            backend_offset,
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let session = self.gate.resolve_session().await?;
        let outcome = self.fetcher.fetch_all(&session.credential).await?;

        if outcome.all_feeds_failed() {
            warn!(failed = outcome.errors.len(), "every feed failed, keeping previous markers");
            return Ok(CycleOutcome::Stale {
                errors: outcome.errors,
            });
        }

        let merged = merge(
            outcome.help,
            outcome.safe,
            &outcome.areas,
            outcome.address.as_ref(),
            self.backend_offset,
        );
        info!(
            markers = merged.markers.len(),
            rejected = merged.rejected.len(),
            source = ?session.position_source,
            "cycle complete"
        );

        Ok(CycleOutcome::Fresh(Snapshot {
            markers: merged.markers,
            rejected: merged.rejected,
            errors: outcome.errors,
            position: session.position,
            position_source: session.position_source,
            permission_denied: session.permission_denied,
            fetched_at: Utc::now(),
        }))
    }
}
