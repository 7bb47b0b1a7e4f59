//! Catalog tools: table listing and stored CREATE TABLE text.

use crate::error::ToolError;
use crate::tools::open_readonly;
use std::path::Path;

pub fn list_tables(db_path: &Path) -> Result<Vec<String>, ToolError> {
    let conn = open_readonly(db_path)?;
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .map_err(|e| ToolError::StorageUnavailable(e.to_string()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ToolError::StorageUnavailable(e.to_string()))?;
    Ok(names)
}

/// An unknown table is a soft result, not an error, so the reasoning loop can
/// read the message and try another name.
pub fn get_table_schema(db_path: &Path, table_name: &str) -> Result<String, ToolError> {
    let conn = open_readonly(db_path)?;
    let mut stmt = conn
        .prepare("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1")
        .map_err(|e| ToolError::StorageUnavailable(e.to_string()))?;
    match stmt.query_row([table_name], |row| row.get::<_, String>(0)) {
        Ok(sql) => Ok(sql),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Ok(format!("Table '{}' not found.", table_name))
        }
        Err(e) => Err(ToolError::StorageUnavailable(e.to_string())),
    }
}
