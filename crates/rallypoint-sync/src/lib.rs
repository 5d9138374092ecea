//! Sync layer: session gate, concurrent feed fetching, and the poll scheduler
//! that keeps the live map current.

pub mod backend;
pub mod fetcher;
pub mod gate;
pub mod location;
pub mod pipeline;
pub mod scheduler;

#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
mod testing;

pub use backend::{BackendError, Feed, MapBackend};
pub use fetcher::{EventFetcher, FetchError, FetchOutcome, SessionExpired};
pub use gate::{GateError, PositionSource, ResolvedSession, SessionGate};
pub use location::{FixedLocation, LocationError, LocationProvider, Permission};
pub use pipeline::{CycleError, CycleOutcome, Snapshot, SyncPipeline};
pub use scheduler::{
    EVENT_BUFFER, HaltReason, PollScheduler, SchedulerError, SchedulerState, SyncEvent,
};

#[cfg(feature = "http")]
pub use http::HttpBackend;
