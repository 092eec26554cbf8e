use openerp_sql::{Row, SqlExecutor, Value};

use super::IndexError;
use crate::model::{NewUser, UserRow};

/// Column list shared by every SELECT on `users`.
const COLUMNS: &str = "uuid, login, name, email, active, scm_accounts, created_at, updated_at";

/// Upper bound on `?` placeholders of one `IN (...)` clause.
const IN_CHUNK: usize = 500;

/// Access to the relational `users` table.
///
/// Every function takes the executor to run on, so the same code works on the
/// store directly and inside an open session.
pub struct UserTable;

impl UserTable {
    /// Insert a new user with a fresh uuid and timestamps.
    pub fn create<E: SqlExecutor + ?Sized>(sql: &E, input: NewUser) -> Result<UserRow, IndexError> {
        if input.login.trim().is_empty() {
            return Err(IndexError::Validation("login is required".into()));
        }
        let now = now_rfc3339();
        let row = UserRow {
            uuid: new_id(),
            login: input.login,
            name: input.name,
            email: input.email,
            active: true,
            scm_accounts: input.scm_accounts,
            created_at: now.clone(),
            updated_at: now,
        };
        Self::insert(sql, &row)?;
        Ok(row)
    }

    pub fn insert<E: SqlExecutor + ?Sized>(sql: &E, row: &UserRow) -> Result<(), IndexError> {
        let stmt = format!(
            "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            COLUMNS
        );
        sql.exec(&stmt, &to_params(row)?)?;
        Ok(())
    }

    /// Overwrite every column of an existing row, keyed by `row.uuid`.
    pub fn update<E: SqlExecutor + ?Sized>(sql: &E, row: &UserRow) -> Result<(), IndexError> {
        let affected = sql.exec(
            "UPDATE users SET login = ?2, name = ?3, email = ?4, active = ?5,
                scm_accounts = ?6, created_at = ?7, updated_at = ?8
             WHERE uuid = ?1",
            &to_params(row)?,
        )?;
        if affected == 0 {
            return Err(IndexError::NotFound(format!("users/{}", row.uuid)));
        }
        Ok(())
    }

    /// Mark a user inactive. The row stays in the table.
    pub fn deactivate<E: SqlExecutor + ?Sized>(sql: &E, uuid: &str) -> Result<(), IndexError> {
        let affected = sql.exec(
            "UPDATE users SET active = 0, updated_at = ?2 WHERE uuid = ?1",
            &[Value::Text(uuid.to_string()), Value::Text(now_rfc3339())],
        )?;
        if affected == 0 {
            return Err(IndexError::NotFound(format!("users/{}", uuid)));
        }
        Ok(())
    }

    pub fn get<E: SqlExecutor + ?Sized>(sql: &E, uuid: &str) -> Result<UserRow, IndexError> {
        let stmt = format!("SELECT {} FROM users WHERE uuid = ?1", COLUMNS);
        let rows = sql.query(&stmt, &[Value::Text(uuid.to_string())])?;
        let row = rows
            .first()
            .ok_or_else(|| IndexError::NotFound(format!("users/{}", uuid)))?;
        from_row(row)
    }

    /// Rows whose uuid is in `uuids`, ordered by uuid. Unknown uuids are skipped.
    pub fn select_by_uuids<E: SqlExecutor + ?Sized>(
        sql: &E,
        uuids: &[String],
    ) -> Result<Vec<UserRow>, IndexError> {
        let mut users = Vec::with_capacity(uuids.len());
        for chunk in uuids.chunks(IN_CHUNK) {
            let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
            let stmt = format!(
                "SELECT {} FROM users WHERE uuid IN ({}) ORDER BY uuid",
                COLUMNS,
                placeholders.join(", ")
            );
            let params: Vec<Value> = chunk.iter().map(|u| Value::Text(u.clone())).collect();
            for row in sql.query(&stmt, &params)? {
                users.push(from_row(&row)?);
            }
        }
        users.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        users.dedup_by(|a, b| a.uuid == b.uuid);
        Ok(users)
    }

    /// One keyset page: up to `limit` rows with uuid greater than `after`,
    /// ordered by uuid. `None` starts from the beginning of the table.
    pub fn select_page_after<E: SqlExecutor + ?Sized>(
        sql: &E,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserRow>, IndexError> {
        let limit = Value::Integer(limit as i64);
        let rows = match after {
            Some(last) => sql.query(
                &format!(
                    "SELECT {} FROM users WHERE uuid > ?1 ORDER BY uuid LIMIT ?2",
                    COLUMNS
                ),
                &[Value::Text(last.to_string()), limit],
            )?,
            None => sql.query(
                &format!("SELECT {} FROM users ORDER BY uuid LIMIT ?1", COLUMNS),
                &[limit],
            )?,
        };
        rows.iter().map(from_row).collect()
    }

    pub fn count<E: SqlExecutor + ?Sized>(sql: &E) -> Result<usize, IndexError> {
        let rows = sql.query("SELECT COUNT(*) AS cnt FROM users", &[])?;
        let cnt = rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0);
        Ok(cnt as usize)
    }
}

/// Generate a new UUIDv4 without dashes.
fn new_id() -> String {
    uuid::Uuid::new_v4().to_string().replace('-', "")
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn optional_text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn to_params(row: &UserRow) -> Result<Vec<Value>, IndexError> {
    let scm_accounts = serde_json::to_string(&row.scm_accounts)
        .map_err(|e| IndexError::Validation(e.to_string()))?;
    Ok(vec![
        Value::Text(row.uuid.clone()),
        Value::Text(row.login.clone()),
        optional_text(&row.name),
        optional_text(&row.email),
        Value::Integer(row.active as i64),
        Value::Text(scm_accounts),
        Value::Text(row.created_at.clone()),
        Value::Text(row.updated_at.clone()),
    ])
}

fn from_row(row: &Row) -> Result<UserRow, IndexError> {
    let uuid = required(row, "uuid", "")?;
    let malformed = |column: &str| IndexError::Indexing(format!("users/{}: bad {} column", uuid, column));

    let scm_accounts = match row.get_str("scm_accounts") {
        Some(json) => serde_json::from_str::<Vec<String>>(json)
            .map_err(|e| IndexError::Indexing(format!("users/{}: scm_accounts: {}", uuid, e)))?,
        None => Vec::new(),
    };

    Ok(UserRow {
        login: required(row, "login", &uuid)?,
        name: row.get_str("name").map(str::to_string),
        email: row.get_str("email").map(str::to_string),
        active: row.get_bool("active").ok_or_else(|| malformed("active"))?,
        scm_accounts,
        created_at: required(row, "created_at", &uuid)?,
        updated_at: required(row, "updated_at", &uuid)?,
        uuid,
    })
}

fn required(row: &Row, column: &str, uuid: &str) -> Result<String, IndexError> {
    row.get_str(column)
        .map(str::to_string)
        .ok_or_else(|| IndexError::Indexing(format!("users/{}: missing {} column", uuid, column)))
}
