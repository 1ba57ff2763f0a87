//! Tracked entity operations.
//!
//! Loads and carriers are created elsewhere in the marketplace; the inserts
//! here cover what the tracking core needs to seed and look them up.

use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{CarrierPosition, EntityState};
use crate::error::{DatabaseError, ServiceResult};
use crate::service::state::{CarrierStatus, EntityKind, LoadStatus};

impl Database {
    /// Insert a load with no position yet
    pub fn insert_load(&self, status: LoadStatus) -> ServiceResult<i64> {
        let conn = self.conn()?;
        let status: &'static str = status.into();

        conn.execute("INSERT INTO loads (status) VALUES (?1)", params![status])
            .map_err(DatabaseError::Query)?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert a carrier user with no position yet
    pub fn insert_carrier(
        &self,
        username: &str,
        company_name: Option<&str>,
        status: CarrierStatus,
    ) -> ServiceResult<i64> {
        let conn = self.conn()?;
        let status: &'static str = status.into();

        conn.execute(
            "INSERT INTO users (username, user_type, company_name, status) VALUES (?1, 'carrier', ?2, ?3)",
            params![username, company_name, status],
        )
        .map_err(DatabaseError::Query)?;

        Ok(conn.last_insert_rowid())
    }

    /// Get the current state of a load or carrier
    pub fn get_entity(&self, kind: EntityKind, id: i64) -> ServiceResult<Option<EntityState>> {
        let conn = self.conn()?;

        let sql = match kind {
            EntityKind::Load => {
                "SELECT id, status, current_lat, current_lng, last_location_update FROM loads WHERE id = ?1"
            }
            EntityKind::Carrier => {
                "SELECT id, status, current_lat, current_lng, last_location_update FROM users WHERE id = ?1 AND user_type = 'carrier'"
            }
        };

        conn.query_row(sql, params![id], |row| EntityState::from_row(row, kind))
            .optional()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Active carriers that have reported a position, ordered by id
    pub fn list_active_carrier_positions(&self) -> ServiceResult<Vec<CarrierPosition>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, COALESCE(company_name, username), current_lat, current_lng
                FROM users
                WHERE user_type = 'carrier'
                  AND status = 'active'
                  AND current_lat IS NOT NULL
                  AND current_lng IS NOT NULL
                ORDER BY id
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map([], CarrierPosition::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PositionWrite;
    use crate::service::state::Position;

    fn place_carrier(db: &Database, id: i64, lat: f64, lng: f64) {
        db.apply_position_write(&PositionWrite {
            kind: EntityKind::Carrier,
            entity_id: id,
            position: Position::new(lat, lng).unwrap(),
            entity_status: None,
            history_status: "location_update".to_string(),
            message: None,
        })
        .unwrap();
    }

    #[test]
    fn test_get_entity() {
        let db = Database::open_in_memory().unwrap();
        let load_id = db.insert_load(LoadStatus::Booked).unwrap();

        let load = db.get_entity(EntityKind::Load, load_id).unwrap().unwrap();
        assert_eq!(load.status.as_deref(), Some("booked"));
        assert!(load.current_position.is_none());
        assert!(load.last_update_at.is_none());

        // A load id is not a carrier id
        assert!(db.get_entity(EntityKind::Carrier, load_id).unwrap().is_none());
        assert!(db.get_entity(EntityKind::Load, 999).unwrap().is_none());
    }

    #[test]
    fn test_list_active_carrier_positions() {
        let db = Database::open_in_memory().unwrap();
        let atlas = db
            .insert_carrier("atlas", Some("Atlas Freight"), CarrierStatus::Active)
            .unwrap();
        let rif = db.insert_carrier("rif", None, CarrierStatus::Active).unwrap();
        let idle = db
            .insert_carrier("idle", Some("Idle Co"), CarrierStatus::Inactive)
            .unwrap();
        let _unplaced = db
            .insert_carrier("unplaced", None, CarrierStatus::Active)
            .unwrap();

        place_carrier(&db, rif, 35.17, -5.27);
        place_carrier(&db, atlas, 33.57, -7.59);
        place_carrier(&db, idle, 34.02, -6.83);

        let carriers = db.list_active_carrier_positions().unwrap();
        assert_eq!(carriers.len(), 2);
        assert_eq!(carriers[0].id, atlas);
        assert_eq!(carriers[0].name, "Atlas Freight");
        assert_eq!(carriers[0].position.as_pair(), [33.57, -7.59]);
        assert_eq!(carriers[1].id, rif);
        assert_eq!(carriers[1].name, "rif");
    }
}
