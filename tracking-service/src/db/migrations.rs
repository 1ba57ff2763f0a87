//! Database schema migrations.
//!
//! Only the tables the tracking core touches are created here; the rest of
//! the marketplace schema belongs to other services.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

/// Run all database migrations.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        -- Marketplace users; rows with user_type = 'carrier' are tracked vehicles
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            user_type TEXT NOT NULL,
            company_name TEXT,
            current_lat REAL,
            current_lng REAL,
            last_location_update TEXT,
            status TEXT DEFAULT 'inactive',
            CHECK ((current_lat IS NULL) = (current_lng IS NULL))
        );

        -- Loads (shipments)
        CREATE TABLE IF NOT EXISTS loads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            status TEXT NOT NULL DEFAULT 'available',
            current_lat REAL,
            current_lng REAL,
            last_location_update TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            CHECK ((current_lat IS NULL) = (current_lng IS NULL))
        );

        -- Append-only tracking history
        CREATE TABLE IF NOT EXISTS load_updates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            load_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            message TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (load_id) REFERENCES loads(id)
        );

        CREATE INDEX IF NOT EXISTS idx_load_updates_recent
            ON load_updates(load_id, created_at DESC, id DESC);
    "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    run_carrier_tracking_migration(conn)?;

    // Needs `status`, which legacy users tables only gain above
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_users_type_status ON users(user_type, status);",
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    Ok(())
}

const CARRIER_TRACKING_COLUMNS: [(&str, &str); 4] = [
    ("current_lat", "REAL"),
    ("current_lng", "REAL"),
    ("last_location_update", "TEXT"),
    ("status", "TEXT DEFAULT 'inactive'"),
];

fn has_column(conn: &Connection, table: &str, column: &str) -> ServiceResult<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |row| row.get(0),
        )
        .map_err(DatabaseError::Query)?;
    Ok(count > 0)
}

/// Migration: add location tracking columns to a users table created before
/// carriers were tracked. Each column is added only if missing.
fn run_carrier_tracking_migration(conn: &Connection) -> ServiceResult<()> {
    for (column, definition) in CARRIER_TRACKING_COLUMNS {
        if has_column(conn, "users", column)? {
            continue;
        }

        conn.execute_batch(&format!(
            "ALTER TABLE users ADD COLUMN {} {};",
            column, definition
        ))
        .map_err(|e| DatabaseError::Migration {
            message: format!("Failed to add users.{}: {}", column, e),
        })?;
    }

    Ok(())
}
