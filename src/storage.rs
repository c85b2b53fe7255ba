use crate::error::StoreError;
use crate::types::IncidentRecord;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Access level granted to a role on a destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// SELECT only
    Read,
    /// SELECT, INSERT, UPDATE, DELETE; the role may grant the same to others
    ReadWrite,
}

impl Privilege {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Read => "read",
            Privilege::ReadWrite => "read_write",
        }
    }

    pub fn with_grant_option(&self) -> bool {
        matches!(self, Privilege::ReadWrite)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tabular store whose rows carry a point geometry.
pub trait SpatialStore: Send {
    fn table_exists(&self, table: &str) -> StoreResult<bool>;

    /// Creates the table with the incident schema. Fails if it already exists.
    fn create_table(&self, table: &str) -> StoreResult<()>;

    /// Removes every row; returns how many were removed.
    fn truncate(&self, table: &str) -> StoreResult<u64>;

    /// Appends one row.
    fn insert(&self, table: &str, record: &IncidentRecord) -> StoreResult<()>;

    fn grant(&self, table: &str, role: &str, privilege: Privilege) -> StoreResult<()>;

    fn row_count(&self, table: &str) -> StoreResult<u64>;
}

/// In-memory store for development and tests.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<HashMap<String, Vec<IncidentRecord>>>,
    grants: Mutex<HashMap<(String, String), Privilege>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows currently in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<IncidentRecord> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    pub fn privilege(&self, table: &str, role: &str) -> Option<Privilege> {
        lock(&self.grants)
            .get(&(table.to_string(), role.to_string()))
            .copied()
    }
}

// Poisoning is ignored: the guarded values are plain rows.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SpatialStore for InMemoryStorage {
    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        Ok(lock(&self.tables).contains_key(table))
    }

    fn create_table(&self, table: &str) -> StoreResult<()> {
        let mut tables = lock(&self.tables);
        if tables.contains_key(table) {
            return Err(StoreError::TableExists(table.to_string()));
        }
        tables.insert(table.to_string(), Vec::new());
        debug!("Created table {}", table);
        Ok(())
    }

    fn truncate(&self, table: &str) -> StoreResult<u64> {
        let mut tables = lock(&self.tables);
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))?;
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }

    fn insert(&self, table: &str, record: &IncidentRecord) -> StoreResult<()> {
        let mut tables = lock(&self.tables);
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))?;
        rows.push(record.clone());
        Ok(())
    }

    fn grant(&self, table: &str, role: &str, privilege: Privilege) -> StoreResult<()> {
        if !self.table_exists(table)? {
            return Err(StoreError::NoSuchTable(table.to_string()));
        }
        lock(&self.grants).insert((table.to_string(), role.to_string()), privilege);
        Ok(())
    }

    fn row_count(&self, table: &str) -> StoreResult<u64> {
        lock(&self.tables)
            .get(table)
            .map(|rows| rows.len() as u64)
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))
    }
}
