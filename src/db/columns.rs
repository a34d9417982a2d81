use std::collections::HashMap;

use docrel_core::ColumnKind;
use sqlx::SqliteConnection;

use super::TableRef;

/// Declared column kinds, loaded once per table and reused for the run.
///
/// Table and column names are matched case-insensitively.
#[derive(Debug, Default)]
pub struct ColumnTypeCache {
    tables: HashMap<String, HashMap<String, ColumnKind>>,
}

impl ColumnTypeCache {
    /// Kind of `column` in `table`. Columns the table does not declare are
    /// treated as [`ColumnKind::Other`].
    pub async fn kind_of(
        &mut self,
        conn: &mut SqliteConnection,
        table: &TableRef,
        column: &str,
    ) -> Result<ColumnKind, sqlx::Error> {
        let key = table.cache_key();
        if !self.tables.contains_key(&key) {
            let columns = load_columns(conn, table).await?;
            tracing::debug!(table = %table, columns = columns.len(), "Loaded column metadata");
            self.tables.insert(key.clone(), columns);
        }

        Ok(self
            .tables
            .get(&key)
            .and_then(|columns| columns.get(&column.to_lowercase()))
            .copied()
            .unwrap_or(ColumnKind::Other))
    }

    #[cfg(test)]
    pub fn cached_tables(&self) -> usize {
        self.tables.len()
    }
}

async fn load_columns(
    conn: &mut SqliteConnection,
    table: &TableRef,
) -> Result<HashMap<String, ColumnKind>, sqlx::Error> {
    let rows: Vec<(String, String)> = match &table.schema {
        Some(schema) => {
            sqlx::query_as("SELECT name, type FROM pragma_table_info(?1, ?2)")
                .bind(&table.name)
                .bind(schema)
                .fetch_all(&mut *conn)
                .await?
        }
        None => {
            sqlx::query_as("SELECT name, type FROM pragma_table_info(?1)")
                .bind(&table.name)
                .fetch_all(&mut *conn)
                .await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|(name, declared)| (name.to_lowercase(), ColumnKind::from_declared(&declared)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    #[tokio::test]
    async fn test_kind_lookup_is_case_insensitive_and_cached() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE Tasks (id TEXT PRIMARY KEY, Due DATE, created_at TIMESTAMP, at_time TIME, title TEXT)",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        let mut cache = ColumnTypeCache::default();
        let table = TableRef::resolve("tasks", None);
        assert_eq!(
            cache.kind_of(&mut conn, &table, "due").await.unwrap(),
            ColumnKind::Date
        );
        assert_eq!(
            cache.kind_of(&mut conn, &table, "CREATED_AT").await.unwrap(),
            ColumnKind::Timestamp
        );
        assert_eq!(
            cache.kind_of(&mut conn, &table, "at_time").await.unwrap(),
            ColumnKind::Time
        );
        assert_eq!(
            cache.kind_of(&mut conn, &table, "title").await.unwrap(),
            ColumnKind::Other
        );
        assert_eq!(
            cache.kind_of(&mut conn, &table, "missing").await.unwrap(),
            ColumnKind::Other
        );
        assert_eq!(cache.cached_tables(), 1);

        // Cached metadata survives schema changes made during the run.
        sqlx::query("ALTER TABLE Tasks ADD COLUMN later DATE")
            .execute(&mut conn)
            .await
            .unwrap();
        assert_eq!(
            cache.kind_of(&mut conn, &table, "later").await.unwrap(),
            ColumnKind::Other
        );
    }

    #[tokio::test]
    async fn test_schema_qualified_table() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query("ATTACH DATABASE ':memory:' AS tenant")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE tenant.events (id TEXT PRIMARY KEY, happened DATETIME)")
            .execute(&mut conn)
            .await
            .unwrap();

        let mut cache = ColumnTypeCache::default();
        let table = TableRef::resolve("events", Some("tenant"));
        assert_eq!(
            cache.kind_of(&mut conn, &table, "happened").await.unwrap(),
            ColumnKind::Timestamp
        );
    }
}
