//! The four tool handlers, as pure functions over the SQLite catalog and
//! engine. No networking in here; the toolhost wires these to the channel.

pub mod plot;
pub mod query;
pub mod schema;

use crate::error::ToolError;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// One connection per tool invocation, read-only, closed on drop. The SELECT
/// gate in `query` is a weak textual defense; the read-only open is what
/// actually stops writes that slip past it.
pub(crate) fn open_readonly(db_path: &Path) -> Result<Connection, ToolError> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| ToolError::StorageUnavailable(format!("{}: {}", db_path.display(), e)))
}
