pub mod config;
pub mod filter;
pub mod marker;
pub mod merge;
pub mod records;
pub mod timestamp;

pub use config::{ConfigError, MAX_POLL_INTERVAL_SECS, MapConfig};
pub use filter::{CategoryFilter, filter_markers};
pub use marker::{
    ADDRESS_MARKER_ID, AddressMarker, AreaMarker, Category, Coordinates, EventMarker, MapMarker,
    MarkerKey, ParseCategoryError,
};
pub use merge::{MergeError, Merged, merge};
pub use records::{AssemblyArea, Credential, Position, RawEventRecord, RecordId, ReportingUser, UserAddress};
pub use timestamp::{minutes_elapsed, parse_timestamp};
