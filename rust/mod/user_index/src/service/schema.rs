use openerp_sql::SqlExecutor;

use super::IndexError;

/// DDL of the relational user source.
///
/// `scm_accounts` holds a JSON array of strings in declaration order.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        uuid TEXT PRIMARY KEY,
        login TEXT NOT NULL UNIQUE,
        name TEXT,
        email TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        scm_accounts TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
];

/// Create the tables if they do not exist yet.
pub fn init_schema<E: SqlExecutor + ?Sized>(sql: &E) -> Result<(), IndexError> {
    for ddl in SCHEMA {
        sql.exec(ddl, &[])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openerp_sql::SqliteStore;

    #[test]
    fn init_is_repeatable() {
        let store = SqliteStore::open_in_memory().unwrap();
        init_schema(&store).unwrap();
        init_schema(&store).unwrap();

        let rows = store.query("SELECT COUNT(*) AS cnt FROM users", &[]).unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(0));
    }
}
