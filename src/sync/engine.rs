//! Sync run orchestration.
//!
//! A run processes collection mappings in dependency order, then merge
//! mappings in declaration order. Every unit streams its main collection
//! inside one transaction; the first failing unit is rolled back and ends
//! the run.

use docrel_core::{
    resolve_alias_path, resolve_document_field, CollectionMapping, Document, MergeMapping,
    SyncSpec,
};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::{Connection, SqliteConnection};

use super::error::{ResolutionError, SyncError};
use super::join::{resolve_joins, JoinOutcome};
use crate::db::{self, RowWriter, TableRef, TargetRow, UpsertOutcome};
use crate::store::{ArangoStore, DocumentCursor, DocumentStore};

/// Counts for one unit of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub unit: String,
    pub table: String,
    pub scanned: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Documents dropped by a required join.
    pub skipped: usize,
}

impl UnitReport {
    fn new(unit: &str, table: &TableRef) -> Self {
        Self {
            unit: unit.to_string(),
            table: table.to_string(),
            ..Self::default()
        }
    }

    pub fn written(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Result of a complete run, one entry per unit in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub units: Vec<UnitReport>,
}

impl RunReport {
    pub fn scanned(&self) -> usize {
        self.units.iter().map(|u| u.scanned).sum()
    }

    pub fn written(&self) -> usize {
        self.units.iter().map(UnitReport::written).sum()
    }

    pub fn skipped(&self) -> usize {
        self.units.iter().map(|u| u.skipped).sum()
    }
}

enum Unit<'a> {
    Collection(&'a CollectionMapping),
    Merge(&'a MergeMapping),
}

impl Unit<'_> {
    fn name(&self) -> &str {
        match self {
            Unit::Collection(mapping) => &mapping.table,
            Unit::Merge(merge) => &merge.name,
        }
    }

    fn collection(&self) -> &str {
        match self {
            Unit::Collection(mapping) => &mapping.collection,
            Unit::Merge(merge) => &merge.main_collection,
        }
    }

    fn table(&self) -> &str {
        match self {
            Unit::Collection(mapping) => &mapping.table,
            Unit::Merge(merge) => &merge.target_table,
        }
    }
}

/// Moves documents from a document store into relational tables.
pub struct SyncEngine<S: DocumentStore> {
    spec: SyncSpec,
    store: S,
    pool: SqlitePool,
}

impl SyncEngine<ArangoStore> {
    /// Connects to both stores described by `spec`.
    ///
    /// The source database is created when missing.
    pub async fn connect(spec: SyncSpec) -> Result<Self, SyncError> {
        spec.validate()?;
        let store = ArangoStore::new(&spec.source)?;
        store.ensure_database().await?;
        let pool = db::connect(&spec.target)
            .await
            .map_err(|e| SyncError::Connection(format!("{}: {}", spec.target.url, e)))?;
        tracing::info!(
            source = %spec.source.base_url(),
            database = %spec.source.database,
            target = %spec.target.url,
            "Connected"
        );
        Self::new(spec, store, pool).await
    }
}

impl<S: DocumentStore> SyncEngine<S> {
    /// Builds an engine over already opened stores and makes sure every
    /// collection the run reads from exists.
    pub async fn new(spec: SyncSpec, store: S, pool: SqlitePool) -> Result<Self, SyncError> {
        spec.validate()?;
        store
            .ensure_collections(&spec.required_collections())
            .await?;
        Ok(Self { spec, store, pool })
    }

    pub fn spec(&self) -> &SyncSpec {
        &self.spec
    }

    /// Runs every unit once.
    ///
    /// `schema` qualifies unqualified target tables and takes precedence
    /// over the configured default schema.
    pub async fn run(&self, schema: Option<&str>) -> Result<RunReport, SyncError> {
        let schema = schema.or(self.spec.target.schema.as_deref());
        let mut units: Vec<Unit<'_>> = self
            .spec
            .ordered_collections()?
            .into_iter()
            .map(Unit::Collection)
            .collect();
        units.extend(self.spec.merges.iter().map(Unit::Merge));

        let mut conn = self.pool.acquire().await?;
        let mut writer = RowWriter::new();
        let mut report = RunReport::default();

        tracing::info!(units = units.len(), schema = ?schema, "Starting sync run");
        for unit in &units {
            let unit_report = self.run_unit(&mut conn, &mut writer, unit, schema).await?;
            report.units.push(unit_report);
        }
        tracing::info!(
            scanned = report.scanned(),
            written = report.written(),
            skipped = report.skipped(),
            "Sync run complete"
        );
        Ok(report)
    }

    /// Releases both store connections.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!("Closed sync engine");
    }

    async fn run_unit(
        &self,
        conn: &mut SqliteConnection,
        writer: &mut RowWriter,
        unit: &Unit<'_>,
        schema: Option<&str>,
    ) -> Result<UnitReport, SyncError> {
        let name = unit.name();
        let table = TableRef::resolve(unit.table(), schema);
        tracing::info!(
            unit = name,
            collection = unit.collection(),
            table = %table,
            "Syncing unit"
        );

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| SyncError::from(e).in_unit(name))?;

        match self.stream_unit(&mut tx, writer, unit, &table).await {
            Ok(report) => {
                tx.commit()
                    .await
                    .map_err(|e| SyncError::from(e).in_unit(name))?;
                tracing::info!(
                    unit = name,
                    scanned = report.scanned,
                    inserted = report.inserted,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    skipped = report.skipped,
                    "Unit committed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(unit = name, error = %e, "Rolling back unit");
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(unit = name, error = %rollback, "Rollback failed");
                }
                Err(e.in_unit(name))
            }
        }
    }

    /// Drains the unit's cursor, closing it whatever the outcome.
    async fn stream_unit(
        &self,
        conn: &mut SqliteConnection,
        writer: &mut RowWriter,
        unit: &Unit<'_>,
        table: &TableRef,
    ) -> Result<UnitReport, SyncError> {
        let mut cursor = self.store.scan(unit.collection()).await?;
        let result = self
            .drain(cursor.as_mut(), conn, writer, unit, table)
            .await;
        let closed = cursor.close().await;
        let report = result?;
        closed?;
        Ok(report)
    }

    async fn drain(
        &self,
        cursor: &mut dyn DocumentCursor,
        conn: &mut SqliteConnection,
        writer: &mut RowWriter,
        unit: &Unit<'_>,
        table: &TableRef,
    ) -> Result<UnitReport, SyncError> {
        let mut report = UnitReport::new(unit.name(), table);

        while let Some(doc) = cursor.next().await? {
            report.scanned += 1;
            let row = match unit {
                Unit::Collection(mapping) => {
                    collection_row(conn, writer, mapping, table, &doc).await?
                }
                Unit::Merge(merge) => match self.merge_row(conn, writer, merge, table, doc).await? {
                    Some(row) => row,
                    None => {
                        report.skipped += 1;
                        continue;
                    }
                },
            };

            match writer.upsert(conn, &row).await? {
                UpsertOutcome::Inserted => report.inserted += 1,
                UpsertOutcome::Updated => report.updated += 1,
                UpsertOutcome::Unchanged => report.unchanged += 1,
            }
        }
        Ok(report)
    }

    /// Resolves the merge's joins for `doc`. `None` when a required join
    /// found nothing.
    async fn merge_row(
        &self,
        conn: &mut SqliteConnection,
        writer: &mut RowWriter,
        merge: &MergeMapping,
        table: &TableRef,
        doc: Document,
    ) -> Result<Option<TargetRow>, SyncError> {
        let id = doc.id().map(str::to_string);
        let context = match resolve_joins(&self.store, &merge.joins, doc).await? {
            JoinOutcome::Resolved(context) => context,
            JoinOutcome::Skipped { alias } => {
                tracing::debug!(
                    merge = %merge.name,
                    alias = %alias,
                    document = id.as_deref().unwrap_or_default(),
                    "Required join found nothing, skipping document"
                );
                return Ok(None);
            }
        };

        let key = resolve_alias_path(&context, &merge.key_field);
        let fields: Vec<(&str, Option<&Value>)> = merge
            .fields
            .iter()
            .map(|(path, column)| (column.as_str(), resolve_alias_path(&context, path)))
            .collect();
        let row = writer
            .prepare(conn, table, &merge.key_column, key, &fields)
            .await?;
        require_key(row, &merge.name, &merge.key_field, context.main()).map(Some)
    }
}

async fn collection_row(
    conn: &mut SqliteConnection,
    writer: &mut RowWriter,
    mapping: &CollectionMapping,
    table: &TableRef,
    doc: &Document,
) -> Result<TargetRow, SyncError> {
    let key = resolve_document_field(doc, &mapping.key_field);
    let fields: Vec<(&str, Option<&Value>)> = mapping
        .fields
        .iter()
        .map(|(path, column)| (column.as_str(), resolve_document_field(doc, path)))
        .collect();
    let row = writer
        .prepare(conn, table, &mapping.key_column, key, &fields)
        .await?;
    require_key(row, &mapping.table, &mapping.key_field, doc)
}

fn require_key(
    row: TargetRow,
    unit: &str,
    key_field: &str,
    doc: &Document,
) -> Result<TargetRow, SyncError> {
    if row.key.is_null() {
        return Err(ResolutionError::MissingKey {
            unit: unit.to_string(),
            key_field: key_field.to_string(),
            document: doc.id().unwrap_or("<no handle>").to_string(),
        }
        .into());
    }
    Ok(row)
}
