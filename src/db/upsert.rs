//! Row upserts keyed on a single column.
//!
//! A row is written with an `UPDATE` first; when no row matched, the same
//! values are inserted together with the key. Rows without any non-key
//! column are probed for existence and inserted only when absent.

use docrel_core::{to_sql_value, SqlValue};
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::SqliteConnection;

use super::{quote_ident, ColumnTypeCache, TableRef};
use crate::sync::SyncError;

/// A coerced row ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRow {
    pub table: TableRef,
    pub key_column: String,
    pub key: SqlValue,
    /// Non-key columns, in mapping order.
    pub columns: Vec<(String, SqlValue)>,
}

/// What [`RowWriter::upsert`] did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Key-only row that already existed.
    Unchanged,
}

/// Coerces and writes rows. Owns the column metadata cache for one run.
#[derive(Debug, Default)]
pub struct RowWriter {
    columns: ColumnTypeCache,
}

impl RowWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coerces the key and every mapped value for `table`.
    ///
    /// Fields targeting the key column (compared case-insensitively) are
    /// dropped; the key is taken from `key` alone.
    pub async fn prepare(
        &mut self,
        conn: &mut SqliteConnection,
        table: &TableRef,
        key_column: &str,
        key: Option<&Value>,
        fields: &[(&str, Option<&Value>)],
    ) -> Result<TargetRow, SyncError> {
        let key = self.coerce(conn, table, key_column, key).await?;

        let mut columns = Vec::with_capacity(fields.len());
        for (column, value) in fields {
            if column.eq_ignore_ascii_case(key_column) {
                continue;
            }
            let value = self.coerce(conn, table, column, *value).await?;
            columns.push((column.to_string(), value));
        }

        Ok(TargetRow {
            table: table.clone(),
            key_column: key_column.to_string(),
            key,
            columns,
        })
    }

    async fn coerce(
        &mut self,
        conn: &mut SqliteConnection,
        table: &TableRef,
        column: &str,
        value: Option<&Value>,
    ) -> Result<SqlValue, SyncError> {
        let kind = self.columns.kind_of(conn, table, column).await?;
        to_sql_value(value, kind).map_err(|source| SyncError::Coercion {
            table: table.to_string(),
            column: column.to_string(),
            source,
        })
    }

    /// Writes `row`, inserting it when no row with its key exists.
    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        row: &TargetRow,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let table = row.table.quoted();
        let key_column = quote_ident(&row.key_column);

        if row.columns.is_empty() {
            let probe = format!("SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1", table, key_column);
            let exists = bind_value(sqlx::query(&probe), &row.key)
                .fetch_optional(&mut *conn)
                .await?
                .is_some();
            if exists {
                return Ok(UpsertOutcome::Unchanged);
            }
            let insert = format!("INSERT INTO {} ({}) VALUES (?1)", table, key_column);
            bind_value(sqlx::query(&insert), &row.key)
                .execute(&mut *conn)
                .await?;
            return Ok(UpsertOutcome::Inserted);
        }

        let assignments: Vec<String> = row
            .columns
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect();
        let update = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            table,
            assignments.join(", "),
            key_column,
            row.columns.len() + 1
        );
        let mut query = sqlx::query(&update);
        for (_, value) in &row.columns {
            query = bind_value(query, value);
        }
        let updated = bind_value(query, &row.key)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if updated > 0 {
            return Ok(UpsertOutcome::Updated);
        }

        let names: Vec<String> = std::iter::once(key_column)
            .chain(row.columns.iter().map(|(column, _)| quote_ident(column)))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders.join(", ")
        );
        let mut query = bind_value(sqlx::query(&insert), &row.key);
        for (_, value) in &row.columns {
            query = bind_value(query, value);
        }
        query.execute(&mut *conn).await?;
        Ok(UpsertOutcome::Inserted)
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(x) => query.bind(*x),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Timestamp(ts) => query.bind(*ts),
        SqlValue::Time(t) => query.bind(*t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::{Connection, Row};

    async fn setup() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE tasks (id TEXT PRIMARY KEY, title TEXT, due DATE, points INTEGER)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE tags (name TEXT PRIMARY KEY)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn
    }

    async fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_then_insert() {
        let mut conn = setup().await;
        let mut writer = RowWriter::new();
        let table = TableRef::resolve("tasks", None);

        let key = json!("t1");
        let title = json!("Write report");
        let due = json!("2023-05-01");
        let row = writer
            .prepare(
                &mut conn,
                &table,
                "id",
                Some(&key),
                &[("title", Some(&title)), ("due", Some(&due)), ("points", None)],
            )
            .await
            .unwrap();
        assert_eq!(row.columns.len(), 3);

        assert_eq!(
            writer.upsert(&mut conn, &row).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            writer.upsert(&mut conn, &row).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(count(&mut conn, "tasks").await, 1);

        let stored = sqlx::query("SELECT title, due, points FROM tasks WHERE id = 't1'")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(stored.get::<String, _>("title"), "Write report");
        assert_eq!(stored.get::<String, _>("due"), "2023-05-01");
        assert_eq!(stored.get::<Option<i64>, _>("points"), None);
    }

    #[tokio::test]
    async fn test_key_column_in_fields_is_ignored() {
        let mut conn = setup().await;
        let mut writer = RowWriter::new();
        let table = TableRef::resolve("tasks", None);

        let key = json!("t1");
        let other = json!("t2");
        let row = writer
            .prepare(&mut conn, &table, "id", Some(&key), &[("ID", Some(&other))])
            .await
            .unwrap();
        assert!(row.columns.is_empty());
        assert_eq!(row.key, SqlValue::Text("t1".to_string()));
    }

    #[tokio::test]
    async fn test_key_only_rows_insert_once() {
        let mut conn = setup().await;
        let mut writer = RowWriter::new();
        let table = TableRef::resolve("tags", None);

        let key = json!("urgent");
        let row = writer
            .prepare(&mut conn, &table, "name", Some(&key), &[])
            .await
            .unwrap();
        assert_eq!(
            writer.upsert(&mut conn, &row).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            writer.upsert(&mut conn, &row).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(count(&mut conn, "tags").await, 1);
    }

    #[tokio::test]
    async fn test_coercion_error_names_column() {
        let mut conn = setup().await;
        let mut writer = RowWriter::new();
        let table = TableRef::resolve("tasks", None);

        let key = json!("t1");
        let due = json!("not-a-date");
        let err = writer
            .prepare(&mut conn, &table, "id", Some(&key), &[("due", Some(&due))])
            .await
            .unwrap_err();
        match err {
            SyncError::Coercion { table, column, .. } => {
                assert_eq!(table, "tasks");
                assert_eq!(column, "due");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_constraint_violation_surfaces() {
        let mut conn = setup().await;
        sqlx::query("CREATE TABLE strict_tasks (id TEXT PRIMARY KEY, title TEXT NOT NULL)")
            .execute(&mut conn)
            .await
            .unwrap();
        let mut writer = RowWriter::new();
        let table = TableRef::resolve("strict_tasks", None);

        let key = json!("t1");
        let row = writer
            .prepare(&mut conn, &table, "id", Some(&key), &[("title", None)])
            .await
            .unwrap();
        assert!(writer.upsert(&mut conn, &row).await.is_err());
    }
}
