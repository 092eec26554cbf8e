use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::warn;

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, SqlExecutor, SqlSession, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SQLError> {
        self.conn
            .lock()
            .map_err(|e| SQLError::Connection(e.to_string()))
    }
}

impl SqlExecutor for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self.lock()?;
        query_rows(&conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        let conn = self.lock()?;
        exec_statement(&conn, sql, params)
    }
}

impl SQLStore for SqliteStore {
    fn begin(&self) -> Result<Box<dyn SqlSession + '_>, SQLError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| SQLError::Transaction(e.to_string()))?;
        Ok(Box::new(SqliteSession {
            conn,
            finished: false,
        }))
    }
}

/// A transaction holding the store's connection until it finishes.
pub struct SqliteSession<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl SqliteSession<'_> {
    fn finish(&mut self, statement: &str) -> Result<(), SQLError> {
        self.finished = true;
        self.conn
            .execute_batch(statement)
            .map_err(|e| SQLError::Transaction(e.to_string()))
    }
}

impl SqlExecutor for SqliteSession<'_> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        query_rows(&self.conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        exec_statement(&self.conn, sql, params)
    }
}

impl SqlSession for SqliteSession<'_> {
    fn commit(mut self: Box<Self>) -> Result<(), SQLError> {
        let result = self.finish("COMMIT");
        if result.is_err() {
            // A failed COMMIT leaves the transaction open; release it.
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("rollback after failed commit failed: {}", e);
            }
        }
        result
    }

    fn rollback(mut self: Box<Self>) -> Result<(), SQLError> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("rollback of abandoned session failed: {}", e);
            }
        }
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            let columns = column_names
                .iter()
                .enumerate()
                .map(|(i, name)| Ok((name.clone(), row_value_at(row, i)?)))
                .collect::<rusqlite::Result<_>>()?;
            Ok(Row { columns })
        })
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let result: Result<Vec<Row>, SQLError> = rows
        .map(|row| row.map_err(|e| SQLError::Query(e.to_string())))
        .collect();
    result
}

fn exec_statement(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let affected = conn
        .execute(sql, param_refs.as_slice())
        .map_err(|e| SQLError::Execution(e.to_string()))?;

    Ok(affected as u64)
}

/// Extract a Value from a rusqlite row at a given column index.
/// Text that is not valid UTF-8 is an error, not a lossy copy.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Value> {
    use rusqlite::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(
            std::str::from_utf8(t)
                .map_err(rusqlite::Error::Utf8Error)?
                .to_string(),
        ),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        ValueRef::Null => Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec("CREATE TABLE items (id TEXT PRIMARY KEY, qty INTEGER NOT NULL)", &[])
            .unwrap();
        store
    }

    fn count(store: &SqliteStore) -> i64 {
        let rows = store.query("SELECT COUNT(*) AS cnt FROM items", &[]).unwrap();
        rows[0].get_i64("cnt").unwrap()
    }

    #[test]
    fn query_returns_typed_columns() {
        let store = store_with_table();
        store
            .exec(
                "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                &[Value::Text("a".into()), Value::Integer(3)],
            )
            .unwrap();

        let rows = store
            .query("SELECT id, qty, NULL AS nothing FROM items", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("id"), Some("a"));
        assert_eq!(rows[0].get_i64("qty"), Some(3));
        assert_eq!(rows[0].get_bool("qty"), Some(true));
        assert_eq!(rows[0].get("nothing"), Some(&Value::Null));
    }

    #[test]
    fn committed_session_is_visible() {
        let store = store_with_table();
        let session = store.begin().unwrap();
        session
            .exec(
                "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                &[Value::Text("a".into()), Value::Integer(1)],
            )
            .unwrap();
        // Reads inside the session see its own write.
        let rows = session.query("SELECT id FROM items", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        session.commit().unwrap();

        assert_eq!(count(&store), 1);
    }

    #[test]
    fn rollback_discards_writes() {
        let store = store_with_table();
        let session = store.begin().unwrap();
        session
            .exec(
                "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                &[Value::Text("a".into()), Value::Integer(1)],
            )
            .unwrap();
        session.rollback().unwrap();

        assert_eq!(count(&store), 0);
    }

    #[test]
    fn dropped_session_rolls_back() {
        let store = store_with_table();
        {
            let session = store.begin().unwrap();
            session
                .exec(
                    "INSERT INTO items (id, qty) VALUES (?1, ?2)",
                    &[Value::Text("a".into()), Value::Integer(1)],
                )
                .unwrap();
        }

        assert_eq!(count(&store), 0);
        // The connection is usable again after the implicit rollback.
        store.begin().unwrap().commit().unwrap();
    }

    #[test]
    fn invalid_utf8_text_is_an_error() {
        let store = store_with_table();
        let result = store.query("SELECT CAST(X'FF' AS TEXT) AS t", &[]);
        assert!(matches!(result, Err(SQLError::Query(_))));

        let rows = store.query("SELECT CAST(X'6F6B' AS TEXT) AS t", &[]).unwrap();
        assert_eq!(rows[0].get_str("t"), Some("ok"));
    }

    #[test]
    fn failed_commit_releases_the_transaction() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.exec("PRAGMA foreign_keys = ON", &[]).unwrap();
        store
            .exec("CREATE TABLE parent (id TEXT PRIMARY KEY)", &[])
            .unwrap();
        store
            .exec(
                "CREATE TABLE child (id TEXT PRIMARY KEY, parent_id TEXT \
                 REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED)",
                &[],
            )
            .unwrap();

        // The deferred foreign key is only checked at COMMIT.
        let session = store.begin().unwrap();
        session
            .exec("INSERT INTO child (id, parent_id) VALUES ('c', 'missing')", &[])
            .unwrap();
        assert!(matches!(session.commit(), Err(SQLError::Transaction(_))));

        let rows = store.query("SELECT COUNT(*) AS cnt FROM child", &[]).unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(0));
        store.begin().unwrap().commit().unwrap();
    }

    #[test]
    fn open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.exec("CREATE TABLE t (x INTEGER)", &[]).unwrap();
            store.exec("INSERT INTO t (x) VALUES (7)", &[]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let rows = store.query("SELECT x FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_i64("x"), Some(7));
    }
}
