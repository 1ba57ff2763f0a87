//! Database model structs.
//!
//! This module contains the data structures for database records.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::Serialize;

use crate::service::state::{EntityKind, Position};

/// Format used for every stored timestamp. Fixed width, so text order is time order.
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn position_from_columns(
    idx: usize,
    lat: Option<f64>,
    lng: Option<f64>,
) -> Result<Option<Position>, rusqlite::Error> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Position::new(lat, lng).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Real, Box::new(e))
        }),
        _ => Ok(None),
    }
}

/// Current state of a tracked load or carrier
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub id: i64,
    pub kind: EntityKind,
    pub status: Option<String>,
    pub current_position: Option<Position>,
    pub last_update_at: Option<DateTime<Utc>>,
}

impl EntityState {
    /// Columns: id, status, current_lat, current_lng, last_location_update
    pub(crate) fn from_row(row: &Row<'_>, kind: EntityKind) -> Result<Self, rusqlite::Error> {
        let last_update_str: Option<String> = row.get(4)?;

        Ok(Self {
            id: row.get(0)?,
            kind,
            status: row.get(1)?,
            current_position: position_from_columns(2, row.get(2)?, row.get(3)?)?,
            last_update_at: last_update_str
                .map(|s| parse_timestamp(4, &s))
                .transpose()?,
        })
    }
}

/// One row of a load's tracking history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdateRecord {
    pub id: i64,
    pub entity_id: i64,
    pub status: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TrackingUpdateRecord {
    /// Columns: id, load_id, status, latitude, longitude, message, created_at
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at_str: String = row.get(6)?;

        Ok(Self {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            status: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            message: row.get(5)?,
            created_at: parse_timestamp(6, &created_at_str)?,
        })
    }
}

/// History row to append
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackingRecord {
    pub load_id: i64,
    pub status: String,
    pub position: Position,
    pub message: Option<String>,
}

/// A validated update ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct PositionWrite {
    pub kind: EntityKind,
    pub entity_id: i64,
    pub position: Position,
    /// Lifecycle status to store on the entity, if the update carried one
    pub entity_status: Option<&'static str>,
    /// Status recorded in history
    pub history_status: String,
    pub message: Option<String>,
}

impl PositionWrite {
    /// History row for this write. Carriers have no history table.
    pub fn history_record(&self) -> Option<NewTrackingRecord> {
        match self.kind {
            EntityKind::Load => Some(NewTrackingRecord {
                load_id: self.entity_id,
                status: self.history_status.clone(),
                position: self.position,
                message: self.message.clone(),
            }),
            EntityKind::Carrier => None,
        }
    }
}

/// Outcome of a committed [`PositionWrite`]
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedUpdate {
    pub updated_at: DateTime<Utc>,
    pub history: Option<TrackingUpdateRecord>,
}

/// Carrier row feeding the periodic snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierPosition {
    pub id: i64,
    pub name: String,
    pub position: Position,
}

impl CarrierPosition {
    /// Columns: id, name, current_lat, current_lng
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let lat: f64 = row.get(2)?;
        let lng: f64 = row.get(3)?;
        let position = Position::new(lat, lng).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Real, Box::new(e))
        })?;

        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format_sorts_lexically() {
        let early = DateTime::parse_from_rfc3339("2026-03-01T09:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let early_str = format_timestamp(&early);
        let late_str = format_timestamp(&late);
        assert_eq!(early_str, "2026-03-01T09:00:00.500000Z");
        assert!(early_str < late_str);
        assert_eq!(parse_timestamp(0, &early_str).unwrap(), early);
    }

    #[test]
    fn test_history_record_only_for_loads() {
        let write = PositionWrite {
            kind: EntityKind::Load,
            entity_id: 4,
            position: Position::new(1.0, 2.0).unwrap(),
            entity_status: None,
            history_status: "location_update".to_string(),
            message: Some("on time".to_string()),
        };
        let record = write.history_record().unwrap();
        assert_eq!(record.load_id, 4);
        assert_eq!(record.message.as_deref(), Some("on time"));

        let carrier = PositionWrite {
            kind: EntityKind::Carrier,
            ..write
        };
        assert!(carrier.history_record().is_none());
    }
}
