//! Relational store access: connection, table references and metadata.

mod columns;
mod upsert;

pub use columns::ColumnTypeCache;
pub use upsert::{RowWriter, TargetRow, UpsertOutcome};

use docrel_core::TargetConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Opens the relational store.
///
/// The pool holds a single connection, which the engine keeps for the whole
/// run. Tables are expected to exist already.
pub async fn connect(target: &TargetConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&target.url)?.foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    /// Resolves a configured table name.
    ///
    /// `schema.table` keeps its own schema; a bare name takes
    /// `default_schema` when one is given.
    pub fn resolve(table: &str, default_schema: Option<&str>) -> Self {
        match table.split_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            None => Self {
                schema: default_schema
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                name: table.to_string(),
            },
        }
    }

    /// Quoted identifier for use in SQL text.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// Case-insensitive cache key.
    pub fn cache_key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A table and its columns, used by `describe target`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ColumnInfo {
    pub name: String,
    #[sqlx(rename = "type")]
    pub declared_type: String,
    #[sqlx(rename = "notnull")]
    pub not_null: bool,
    pub pk: i64,
}

/// Lists user tables with their columns.
pub async fn describe_tables(pool: &SqlitePool) -> Result<Vec<TableInfo>, sqlx::Error> {
    let tables: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut infos = Vec::with_capacity(tables.len());
    for (name,) in tables {
        let columns: Vec<ColumnInfo> =
            sqlx::query_as("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")
                .bind(&name)
                .fetch_all(pool)
                .await?;
        infos.push(TableInfo { name, columns });
    }
    Ok(infos)
}
