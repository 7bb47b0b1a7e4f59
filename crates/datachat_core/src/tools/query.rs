//! Read-only SQL execution with the SELECT safety gate.

use crate::error::ToolError;
use crate::tools::open_readonly;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::path::Path;

pub type Row = Map<String, Value>;

/// Textual gate: after trimming, the statement must begin with the token
/// `SELECT` (any case). This does not stop statement chaining or
/// data-modifying functions inside a SELECT; the read-only connection in
/// `open_readonly` is the backstop.
pub fn is_select(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    match trimmed.get(..6) {
        Some(head) if head.eq_ignore_ascii_case("select") => trimmed[6..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_'),
        _ => false,
    }
}

/// Rejected statements never reach the engine. Engine execution errors
/// (syntax, missing columns) come back as a single `{"error": message}` row
/// so the caller always receives a well-formed result it can read.
pub fn run_query(db_path: &Path, sql: &str) -> Result<Vec<Row>, ToolError> {
    if !is_select(sql) {
        return Err(ToolError::RejectedStatement);
    }
    let conn = open_readonly(db_path)?;
    match execute_select(&conn, sql) {
        Ok(rows) => Ok(rows),
        Err(e) => {
            let mut row = Map::new();
            row.insert("error".into(), Value::String(e.to_string()));
            Ok(vec![row])
        }
    }
}

fn execute_select(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = Map::new();
        for (i, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), json_value(row.get_ref(i)?));
        }
        out.push(obj);
    }
    Ok(out)
}

fn json_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(x) => x.into(),
        ValueRef::Real(x) => x.into(),
        ValueRef::Text(s) => String::from_utf8_lossy(s).into_owned().into(),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fixtures::seeded_db;

    #[test]
    fn gate_rejects_everything_that_is_not_select() {
        for sql in [
            "DROP TABLE sales",
            "  delete from products",
            "INSERT INTO regions VALUES (3, 'East')",
            "UPDATE products SET price = 0",
            "PRAGMA writable_schema = 1",
            "CREATE TABLE t (x)",
            "SELECTX 1",
            "",
            "   ",
        ] {
            let (_dir, db) = seeded_db();
            let err = run_query(&db, sql).unwrap_err();
            assert!(
                matches!(err, ToolError::RejectedStatement),
                "expected rejection for {sql:?}"
            );
        }
    }

    #[test]
    fn gate_fires_before_the_engine_is_touched() {
        // A rejected statement against a database that does not exist must
        // still report rejection, not a storage failure.
        let err = run_query(std::path::Path::new("/nonexistent/nowhere.db"), "DROP TABLE x")
            .unwrap_err();
        assert!(matches!(err, ToolError::RejectedStatement));
    }

    #[test]
    fn gate_accepts_select_in_any_case_with_leading_whitespace() {
        assert!(is_select("SELECT 1"));
        assert!(is_select("  select * from sales"));
        assert!(is_select("\n\tSeLeCt(1)"));
        assert!(!is_select("selection"));
    }

    #[test]
    fn aggregate_returns_exactly_one_row_with_the_aliased_column() {
        let (_dir, db) = seeded_db();
        let rows = run_query(&db, "SELECT SUM(quantity) AS total FROM sales").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0]["total"], serde_json::json!(10));
    }

    #[test]
    fn row_keys_match_the_query_columns() {
        let (_dir, db) = seeded_db();
        let rows = run_query(&db, "SELECT id, name, price FROM products ORDER BY id").unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            let keys: Vec<_> = row.keys().cloned().collect();
            let mut sorted = keys.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), 3, "each column exactly once");
        }
        assert_eq!(rows[0]["name"], "Widget");
        assert_eq!(rows[1]["price"], serde_json::json!(49.0));
    }

    #[test]
    fn null_campaign_id_maps_to_json_null() {
        let (_dir, db) = seeded_db();
        let rows = run_query(&db, "SELECT campaign_id FROM sales WHERE id = 2").unwrap();
        assert_eq!(rows[0]["campaign_id"], Value::Null);
    }

    #[test]
    fn engine_errors_come_back_as_an_error_row() {
        let (_dir, db) = seeded_db();
        let rows = run_query(&db, "SELECT nope FROM nothing_here").unwrap();
        assert_eq!(rows.len(), 1);
        let msg = rows[0]["error"].as_str().unwrap();
        assert!(msg.contains("nothing_here"), "got: {msg}");
    }

    #[test]
    fn write_through_select_prefix_is_stopped_by_readonly_connection() {
        // Chained statement slips past the textual gate; the read-only open
        // means the engine refuses the write half.
        let (_dir, db) = seeded_db();
        let rows = run_query(&db, "SELECT 1; DROP TABLE sales").unwrap();
        // Either an error row (extra statement refused) or a plain result;
        // in both cases the table must survive.
        assert!(!rows.is_empty());
        let rows = run_query(&db, "SELECT COUNT(*) AS n FROM sales").unwrap();
        assert_eq!(rows[0]["n"], serde_json::json!(3));
    }
}
