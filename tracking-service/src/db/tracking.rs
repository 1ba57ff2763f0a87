//! Position and tracking history operations.
//!
//! Current positions live on the entity rows; every accepted load update is
//! also appended to `load_updates`, which is never modified afterwards.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Database;
use super::models::{
    AppliedUpdate, NewTrackingRecord, PositionWrite, TrackingUpdateRecord, format_timestamp,
};
use crate::error::{DatabaseError, ServiceError, ServiceResult};
use crate::service::state::{EntityKind, Position};

fn write_position(
    conn: &Connection,
    kind: EntityKind,
    entity_id: i64,
    position: Position,
    status: Option<&str>,
    at: &DateTime<Utc>,
) -> ServiceResult<()> {
    let sql = match kind {
        EntityKind::Load => {
            r#"
            UPDATE loads
            SET current_lat = ?2, current_lng = ?3, last_location_update = ?4,
                status = COALESCE(?5, status)
            WHERE id = ?1
            "#
        }
        EntityKind::Carrier => {
            r#"
            UPDATE users
            SET current_lat = ?2, current_lng = ?3, last_location_update = ?4,
                status = COALESCE(?5, status)
            WHERE id = ?1 AND user_type = 'carrier'
            "#
        }
    };

    let rows = conn
        .execute(
            sql,
            params![
                entity_id,
                position.lat(),
                position.lng(),
                format_timestamp(at),
                status
            ],
        )
        .map_err(DatabaseError::Query)?;

    if rows == 0 {
        return Err(ServiceError::EntityNotFound {
            kind: kind.into(),
            entity_id,
        });
    }

    Ok(())
}

fn insert_history(
    conn: &Connection,
    record: &NewTrackingRecord,
    at: &DateTime<Utc>,
) -> ServiceResult<TrackingUpdateRecord> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM loads WHERE id = ?1",
            params![record.load_id],
            |_| Ok(()),
        )
        .optional()
        .map_err(DatabaseError::Query)?
        .is_some();

    if !exists {
        return Err(ServiceError::EntityNotFound {
            kind: EntityKind::Load.into(),
            entity_id: record.load_id,
        });
    }

    conn.execute(
        r#"
        INSERT INTO load_updates (load_id, status, latitude, longitude, message, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            record.load_id,
            record.status,
            record.position.lat(),
            record.position.lng(),
            record.message,
            format_timestamp(at),
        ],
    )
    .map_err(DatabaseError::Query)?;

    Ok(TrackingUpdateRecord {
        id: conn.last_insert_rowid(),
        entity_id: record.load_id,
        status: record.status.clone(),
        latitude: record.position.lat(),
        longitude: record.position.lng(),
        message: record.message.clone(),
        created_at: *at,
    })
}

impl Database {
    /// Set an entity's current position, and its status when given
    pub fn update_position(
        &self,
        kind: EntityKind,
        entity_id: i64,
        position: Position,
        status: Option<&str>,
    ) -> ServiceResult<DateTime<Utc>> {
        let conn = self.conn()?;
        let at = self.next_history_timestamp()?;

        write_position(&conn, kind, entity_id, position, status, &at)?;

        Ok(at)
    }

    /// Append one history row for a load
    pub fn append_history(&self, record: &NewTrackingRecord) -> ServiceResult<TrackingUpdateRecord> {
        let conn = self.conn()?;
        let at = self.next_history_timestamp()?;

        insert_history(&conn, record, &at)
    }

    /// Write position and history for one update in a single transaction
    pub fn apply_position_write(&self, write: &PositionWrite) -> ServiceResult<AppliedUpdate> {
        let mut conn = self.conn()?;
        let at = self.next_history_timestamp()?;

        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        write_position(
            &tx,
            write.kind,
            write.entity_id,
            write.position,
            write.entity_status,
            &at,
        )?;

        let history = write
            .history_record()
            .map(|record| insert_history(&tx, &record, &at))
            .transpose()?;

        tx.commit().map_err(DatabaseError::Query)?;

        Ok(AppliedUpdate {
            updated_at: at,
            history,
        })
    }

    /// Most recent history rows for a load, newest first
    pub fn recent_history(
        &self,
        load_id: i64,
        limit: usize,
    ) -> ServiceResult<Vec<TrackingUpdateRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, load_id, status, latitude, longitude, message, created_at
                FROM load_updates
                WHERE load_id = ?1
                ORDER BY created_at DESC, id DESC
                LIMIT ?2
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![load_id, limit as i64], TrackingUpdateRecord::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::state::{CarrierStatus, LoadStatus};

    fn pos(lat: f64, lng: f64) -> Position {
        Position::new(lat, lng).unwrap()
    }

    fn load_write(entity_id: i64, lat: f64, lng: f64, status: Option<&'static str>) -> PositionWrite {
        PositionWrite {
            kind: EntityKind::Load,
            entity_id,
            position: pos(lat, lng),
            entity_status: status,
            history_status: status.unwrap_or("location_update").to_string(),
            message: None,
        }
    }

    #[test]
    fn test_update_position() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_load(LoadStatus::Booked).unwrap();

        let at = db
            .update_position(EntityKind::Load, id, pos(31.79, -7.09), Some("in_transit"))
            .unwrap();

        let load = db.get_entity(EntityKind::Load, id).unwrap().unwrap();
        assert_eq!(load.current_position, Some(pos(31.79, -7.09)));
        assert_eq!(load.status.as_deref(), Some("in_transit"));
        assert_eq!(load.last_update_at, Some(at));

        // Status is kept when the update carries none
        db.update_position(EntityKind::Load, id, pos(31.8, -7.1), None)
            .unwrap();
        let load = db.get_entity(EntityKind::Load, id).unwrap().unwrap();
        assert_eq!(load.status.as_deref(), Some("in_transit"));
    }

    #[test]
    fn test_update_position_unknown_entity() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .update_position(EntityKind::Load, 42, pos(1.0, 1.0), None)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::EntityNotFound { entity_id: 42, .. }
        ));
    }

    #[test]
    fn test_append_history_allows_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_load(LoadStatus::InTransit).unwrap();
        let record = NewTrackingRecord {
            load_id: id,
            status: "location_update".to_string(),
            position: pos(31.0, -7.0),
            message: None,
        };

        let first = db.append_history(&record).unwrap();
        let second = db.append_history(&record).unwrap();
        assert_ne!(first.id, second.id);
        assert!(second.created_at >= first.created_at);

        assert_eq!(db.recent_history(id, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_append_history_unknown_load() {
        let db = Database::open_in_memory().unwrap();
        let record = NewTrackingRecord {
            load_id: 5,
            status: "location_update".to_string(),
            position: pos(31.0, -7.0),
            message: None,
        };
        assert!(matches!(
            db.append_history(&record),
            Err(ServiceError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn test_apply_position_write() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_load(LoadStatus::Booked).unwrap();

        let applied = db
            .apply_position_write(&load_write(id, 31.79, -7.09, Some("in_transit")))
            .unwrap();
        let history = applied.history.unwrap();
        assert_eq!(history.status, "in_transit");
        assert_eq!(history.created_at, applied.updated_at);

        let load = db.get_entity(EntityKind::Load, id).unwrap().unwrap();
        assert_eq!(load.current_position, Some(pos(31.79, -7.09)));
    }

    #[test]
    fn test_apply_position_write_unknown_load_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.apply_position_write(&load_write(77, 1.0, 1.0, None)).is_err());

        let count: i64 = db
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM load_updates", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_apply_carrier_write_skips_history() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .insert_carrier("atlas", None, CarrierStatus::Inactive)
            .unwrap();

        let applied = db
            .apply_position_write(&PositionWrite {
                kind: EntityKind::Carrier,
                entity_id: id,
                position: pos(33.57, -7.59),
                entity_status: Some("active"),
                history_status: "active".to_string(),
                message: None,
            })
            .unwrap();
        assert!(applied.history.is_none());

        let carrier = db.get_entity(EntityKind::Carrier, id).unwrap().unwrap();
        assert_eq!(carrier.status.as_deref(), Some("active"));
        assert_eq!(db.list_active_carrier_positions().unwrap().len(), 1);
    }

    #[test]
    fn test_recent_history_is_newest_first_and_limited() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_load(LoadStatus::InTransit).unwrap();
        let other = db.insert_load(LoadStatus::InTransit).unwrap();

        for i in 0..5 {
            db.apply_position_write(&load_write(id, 30.0 + i as f64, -7.0, None))
                .unwrap();
        }
        db.apply_position_write(&load_write(other, 10.0, 10.0, None))
            .unwrap();

        let recent = db.recent_history(id, 3).unwrap();
        let lats: Vec<f64> = recent.iter().map(|r| r.latitude).collect();
        assert_eq!(lats, vec![34.0, 33.0, 32.0]);
        assert!(recent.iter().all(|r| r.entity_id == id));
        assert!(recent.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn test_history_clock_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.db");

        let first = {
            let db = Database::open(&path).unwrap();
            let id = db.insert_load(LoadStatus::InTransit).unwrap();
            db.apply_position_write(&load_write(id, 1.0, 1.0, None))
                .unwrap()
                .updated_at
        };

        let db = Database::open(&path).unwrap();
        assert!(db.next_history_timestamp().unwrap() >= first);
    }
}
