use crate::constants::*;
use crate::error::StoreError;
use crate::storage::{Privilege, SpatialStore, StoreResult};
use crate::types::IncidentRecord;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// SQLite-backed destination. Geometry is stored as WKT in `SHAPE` with the
/// coordinates duplicated in `SHAPE_X`/`SHAPE_Y` for plain SQL filtering.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::Other {
                    message: format!("Failed to create {}: {e}", parent.display()),
                })?;
            }
        }
        info!("Opening destination database at {}", db_path.display());
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {PRIVILEGES_TABLE} (
                table_name    TEXT NOT NULL,
                role          TEXT NOT NULL,
                privilege     TEXT NOT NULL,
                grant_option  INTEGER NOT NULL,
                granted_at    TEXT NOT NULL,
                PRIMARY KEY (table_name, role)
            );
            "#
        ))?;
        Ok(Self { conn })
    }

    /// The privilege recorded for `role` on `table`, as stored.
    pub fn privilege(&self, table: &str, role: &str) -> StoreResult<Option<(String, bool)>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT privilege, grant_option FROM {PRIVILEGES_TABLE} WHERE table_name = ?1 AND role = ?2"
                ),
                params![table, role],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()?;
        Ok(row)
    }

    /// All rows of `table` ordered by `OBJECTID`.
    pub fn load_rows(&self, table: &str) -> StoreResult<Vec<IncidentRecord>> {
        let ident = quote_ident(table)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COL_TITLE}, {COL_CATEGORY}, {COL_DESCRIPTION}, {COL_PUB_DATE}, {COL_LINK}, {COL_LAT}, {COL_LON} \
             FROM {ident} ORDER BY {COL_OBJECT_ID}"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(IncidentRecord::new(
                &row.get::<_, String>(0)?,
                &row.get::<_, String>(1)?,
                &row.get::<_, String>(2)?,
                &row.get::<_, String>(3)?,
                &row.get::<_, String>(4)?,
                &row.get::<_, String>(5)?,
                &row.get::<_, String>(6)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn require_table(&self, table: &str) -> StoreResult<String> {
        let ident = quote_ident(table)?;
        if !self.table_exists(table)? {
            return Err(StoreError::NoSuchTable(table.to_string()));
        }
        Ok(ident)
    }
}

/// Table names come from configuration, so only plain identifiers are accepted.
fn quote_ident(table: &str) -> StoreResult<String> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(StoreError::Other {
            message: format!("invalid table name '{table}'"),
        });
    }
    Ok(format!("\"{table}\""))
}

impl SpatialStore for SqliteStore {
    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        // SQLite identifiers are case-insensitive
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&self, table: &str) -> StoreResult<()> {
        let ident = quote_ident(table)?;
        if self.table_exists(table)? {
            return Err(StoreError::TableExists(table.to_string()));
        }
        self.conn.execute_batch(&format!(
            r#"
            CREATE TABLE {ident} (
                {COL_OBJECT_ID}   INTEGER PRIMARY KEY AUTOINCREMENT,
                {COL_TITLE}       TEXT NOT NULL DEFAULT '' CHECK (length({COL_TITLE}) <= {TITLE_MAX}),
                {COL_CATEGORY}    TEXT NOT NULL DEFAULT '' CHECK (length({COL_CATEGORY}) <= {CATEGORY_MAX}),
                {COL_DESCRIPTION} TEXT NOT NULL DEFAULT '' CHECK (length({COL_DESCRIPTION}) <= {DESCRIPTION_MAX}),
                {COL_PUB_DATE}    TEXT NOT NULL DEFAULT '' CHECK (length({COL_PUB_DATE}) <= {PUB_DATE_MAX}),
                {COL_LINK}        TEXT NOT NULL DEFAULT '' CHECK (length({COL_LINK}) <= {LINK_MAX}),
                {COL_LAT}         TEXT NOT NULL DEFAULT '' CHECK (length({COL_LAT}) <= {LAT_MAX}),
                {COL_LON}         TEXT NOT NULL DEFAULT '' CHECK (length({COL_LON}) <= {LON_MAX}),
                {COL_SHAPE}       TEXT,
                {COL_SHAPE_X}     REAL,
                {COL_SHAPE_Y}     REAL
            );
            "#
        ))?;
        info!("Created table {}", table);
        Ok(())
    }

    fn truncate(&self, table: &str) -> StoreResult<u64> {
        let ident = self.require_table(table)?;
        let removed = self.conn.execute(&format!("DELETE FROM {ident}"), [])?;
        Ok(removed as u64)
    }

    fn insert(&self, table: &str, record: &IncidentRecord) -> StoreResult<()> {
        let ident = quote_ident(table)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {ident} ({COL_TITLE}, {COL_CATEGORY}, {COL_DESCRIPTION}, {COL_PUB_DATE}, {COL_LINK}, \
                 {COL_LAT}, {COL_LON}, {COL_SHAPE}, {COL_SHAPE_X}, {COL_SHAPE_Y}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                record.title,
                record.category,
                record.description,
                record.pub_date,
                record.link,
                record.latitude,
                record.longitude,
                record.shape_wkt(),
                record.point.map(|p| p.x()),
                record.point.map(|p| p.y()),
            ],
        )?;
        Ok(())
    }

    fn grant(&self, table: &str, role: &str, privilege: Privilege) -> StoreResult<()> {
        self.require_table(table)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {PRIVILEGES_TABLE} (table_name, role, privilege, grant_option, granted_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(table_name, role) DO UPDATE SET privilege=excluded.privilege, \
                 grant_option=excluded.grant_option, granted_at=excluded.granted_at"
            ),
            params![
                table,
                role,
                privilege.as_str(),
                privilege.with_grant_option() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!("Granted {} on {} to {}", privilege, table, role);
        Ok(())
    }

    fn row_count(&self, table: &str) -> StoreResult<u64> {
        let ident = self.require_table(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {ident}"), [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> IncidentRecord {
        IncidentRecord::new(
            title,
            "FIRE",
            "Brush fire",
            "Fri, 18 Jul 2014 12:00:00 GMT",
            "http://example.org/1",
            "43.04945",
            "-70.81767",
        )
    }

    #[test]
    fn test_create_insert_and_read_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(!store.table_exists("INCIDENTS").unwrap());

        store.create_table("INCIDENTS").unwrap();
        store.insert("INCIDENTS", &record("first")).unwrap();
        store.insert("INCIDENTS", &record("second")).unwrap();

        assert!(store.table_exists("INCIDENTS").unwrap());
        assert_eq!(store.row_count("INCIDENTS").unwrap(), 2);
        let rows = store.load_rows("INCIDENTS").unwrap();
        assert_eq!(rows[0], record("first"));
        assert_eq!(rows[1].title, "second");
    }

    #[test]
    fn test_table_lookup_ignores_case() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_table("INCIDENTS").unwrap();

        assert!(store.table_exists("incidents").unwrap());
        assert!(matches!(store.create_table("incidents"), Err(StoreError::TableExists(_))));
        store.insert("incidents", &record("lower")).unwrap();
        assert_eq!(store.truncate("Incidents").unwrap(), 1);
    }

    #[test]
    fn test_shape_columns() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_table("INCIDENTS").unwrap();
        store.insert("INCIDENTS", &record("first")).unwrap();
        store
            .insert("INCIDENTS", &IncidentRecord::new("no coords", "", "", "", "", "", ""))
            .unwrap();

        let mut stmt = store
            .conn
            .prepare("SELECT SHAPE, SHAPE_X, SHAPE_Y FROM INCIDENTS ORDER BY OBJECTID")
            .unwrap();
        let shapes: Vec<(Option<String>, Option<f64>, Option<f64>)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(
            shapes[0],
            (
                Some("POINT (-70.81767 43.04945)".to_string()),
                Some(-70.81767),
                Some(43.04945)
            )
        );
        assert_eq!(shapes[1], (None, None, None));
    }

    #[test]
    fn test_truncate_removes_all_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_table("INCIDENTS").unwrap();
        for i in 0..3 {
            store.insert("INCIDENTS", &record(&format!("r{i}"))).unwrap();
        }

        assert_eq!(store.truncate("INCIDENTS").unwrap(), 3);
        assert_eq!(store.row_count("INCIDENTS").unwrap(), 0);
    }

    #[test]
    fn test_missing_table_errors() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(store.truncate("INCIDENTS"), Err(StoreError::NoSuchTable(_))));
        assert!(matches!(
            store.grant("INCIDENTS", "gis_viewer", Privilege::Read),
            Err(StoreError::NoSuchTable(_))
        ));
    }

    #[test]
    fn test_rejects_unsafe_table_names() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.create_table("x; DROP TABLE y").is_err());
        assert!(store.create_table("1abc").is_err());
        assert!(store.create_table("").is_err());
    }

    #[test]
    fn test_width_checks_reject_oversized_values() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_table("INCIDENTS").unwrap();
        let mut oversized = record("ok");
        oversized.title = "t".repeat(TITLE_MAX + 1);

        assert!(store.insert("INCIDENTS", &oversized).is_err());
        assert_eq!(store.row_count("INCIDENTS").unwrap(), 0);
    }

    #[test]
    fn test_grants_are_recorded_and_replaced() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_table("INCIDENTS").unwrap();
        store.grant("INCIDENTS", "gis_viewer", Privilege::Read).unwrap();
        store.grant("INCIDENTS", "gis_editor", Privilege::Read).unwrap();
        store.grant("INCIDENTS", "gis_editor", Privilege::ReadWrite).unwrap();

        assert_eq!(
            store.privilege("INCIDENTS", "gis_viewer").unwrap(),
            Some(("read".to_string(), false))
        );
        assert_eq!(
            store.privilege("INCIDENTS", "gis_editor").unwrap(),
            Some(("read_write".to_string(), true))
        );
        assert_eq!(store.privilege("INCIDENTS", "nobody").unwrap(), None);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gdb").join("events.sqlite");
        let store = SqliteStore::open(&path).unwrap();
        store.create_table("INCIDENTS").unwrap();
        assert!(path.exists());
    }
}
