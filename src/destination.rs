use crate::error::{Result, StageError};
use std::fmt;
use std::path::PathBuf;

/// A destination written as `<location>/<qualified name>`, for example
/// `data/events.sqlite/EVENTS.DBO.UICDS_PRIVATE_SECTOR`.
///
/// The location is the database file; the table is the last `.`-separated
/// segment of the qualified name (`UICDS_PRIVATE_SECTOR`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    raw: String,
    location: String,
    qualified_name: String,
    table: String,
}

impl TableRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let location = get_path(raw)?;
        let qualified_name = get_file_name(raw)?;
        let table = clean_name(&qualified_name)?;
        Ok(Self {
            raw: raw.to_string(),
            location,
            qualified_name,
            table,
        })
    }

    /// Directory-like prefix, without the trailing separator.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.location)
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_last_separator(raw: &str) -> Option<(&str, &str)> {
    raw.rfind(['/', '\\']).map(|idx| (&raw[..idx], &raw[idx + 1..]))
}

/// Everything before the last path separator.
pub fn get_path(raw: &str) -> Result<String> {
    match split_last_separator(raw.trim()) {
        Some((location, _)) if !location.is_empty() => Ok(location.to_string()),
        _ => Err(StageError::PathParsing(raw.to_string())),
    }
}

/// Everything after the last path separator.
pub fn get_file_name(raw: &str) -> Result<String> {
    match split_last_separator(raw.trim()) {
        Some((_, name)) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(StageError::PathParsing(raw.to_string())),
    }
}

/// Strips database and owner qualifiers: `EVENTS.DBO.INCIDENTS` -> `INCIDENTS`.
pub fn clean_name(name: &str) -> Result<String> {
    let last = name.rsplit('.').next().unwrap_or(name);
    if last.is_empty() {
        return Err(StageError::PathParsing(name.to_string()));
    }
    Ok(last.to_string())
}
