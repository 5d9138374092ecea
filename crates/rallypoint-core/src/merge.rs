//! Merge the per-feed collections into one marker set.
//!
//! The result always replaces the previous set wholesale. Order is help,
//! safe, area, then the optional address marker.

use chrono::FixedOffset;
use thiserror::Error;
use tracing::{debug, warn};

use crate::marker::{
    ADDRESS_MARKER_ID, AddressMarker, AreaMarker, Category, Coordinates, EventMarker, MapMarker,
};
use crate::records::{AssemblyArea, RawEventRecord, RecordId, UserAddress, coordinates_in_range};
use crate::timestamp::parse_timestamp;

/// A record that could not become a marker. Only that record is dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("invalid {category} record {id}: {reason}")]
    InvalidRecord {
        category: Category,
        id: RecordId,
        reason: &'static str,
    },
}

/// Output of [`merge`]: the markers plus the records that were rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub markers: Vec<MapMarker>,
    pub rejected: Vec<MergeError>,
}

/// Build the marker set for one cycle.
///
/// `naive_offset` is the backend's UTC offset, applied to `created_at`
/// values that carry no zone of their own.
pub fn merge(
    help: Vec<RawEventRecord>,
    safe: Vec<RawEventRecord>,
    areas: &[AssemblyArea],
    address: Option<&UserAddress>,
    naive_offset: FixedOffset,
) -> Merged {
    let mut merged = Merged {
        markers: Vec::with_capacity(help.len() + safe.len() + areas.len() + 1),
        rejected: Vec::new(),
    };

    for (row, record) in help.into_iter().enumerate() {
        merged.push(event_marker(Category::Help, row, record, naive_offset).map(MapMarker::Help));
    }
    for (row, record) in safe.into_iter().enumerate() {
        merged.push(event_marker(Category::Safe, row, record, naive_offset).map(MapMarker::Safe));
    }
    for area in areas {
        merged.push(area_marker(area).map(MapMarker::Area));
    }
    if let Some(addr) = address {
        merged.push(address_marker(addr).map(MapMarker::Address));
    }

    debug!(
        markers = merged.markers.len(),
        rejected = merged.rejected.len(),
        "merged marker set"
    );
    merged
}

impl Merged {
    fn push(&mut self, result: Result<MapMarker, MergeError>) {
        match result {
            Ok(marker) => self.markers.push(marker),
            Err(err) => {
                warn!(error = %err, "dropping record");
                self.rejected.push(err);
            }
        }
    }
}

fn checked_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Coordinates, &'static str> {
    match (latitude, longitude) {
        (None, None) => Err("missing latitude and longitude"),
        (None, Some(_)) => Err("missing latitude"),
        (Some(_), None) => Err("missing longitude"),
        (Some(latitude), Some(longitude)) if coordinates_in_range(latitude, longitude) => {
            Ok(Coordinates {
                latitude,
                longitude,
            })
        }
        (Some(_), Some(_)) => Err("coordinates out of range"),
    }
}

/// `row` is the record's zero-based position in its feed, used to name
/// records that arrive without an id.
fn event_marker(
    category: Category,
    row: usize,
    record: RawEventRecord,
    naive_offset: FixedOffset,
) -> Result<EventMarker, MergeError> {
    let Some(id) = record.id else {
        return Err(MergeError::InvalidRecord {
            category,
            id: RecordId::Text(format!("#{row}")),
            reason: "missing id",
        });
    };
    let coordinates =
        checked_coordinates(record.latitude, record.longitude).map_err(|reason| {
            MergeError::InvalidRecord {
                category,
                id: id.clone(),
                reason,
            }
        })?;

    let created_at = record.created_at.as_deref().and_then(|raw| {
        let parsed = parse_timestamp(raw, naive_offset);
        if parsed.is_none() {
            warn!(%category, %id, raw, "unparseable created_at, ignoring");
        }
        parsed
    });

    Ok(EventMarker {
        id,
        coordinates,
        message: record.message.filter(|m| !m.trim().is_empty()),
        created_at,
        user: record.user,
    })
}

fn area_marker(area: &AssemblyArea) -> Result<AreaMarker, MergeError> {
    let coordinates = checked_coordinates(Some(area.latitude), Some(area.longitude)).map_err(
        |reason| MergeError::InvalidRecord {
            category: Category::Area,
            id: area.id.clone(),
            reason,
        },
    )?;
    Ok(AreaMarker {
        id: area.id.clone(),
        coordinates,
    })
}

fn address_marker(address: &UserAddress) -> Result<AddressMarker, MergeError> {
    let id = RecordId::from(ADDRESS_MARKER_ID);
    let coordinates = checked_coordinates(address.latitude, address.longitude).map_err(
        |reason| MergeError::InvalidRecord {
            category: Category::Address,
            id: id.clone(),
            reason,
        },
    )?;
    Ok(AddressMarker {
        id,
        coordinates,
        message: address.label(),
    })
}
