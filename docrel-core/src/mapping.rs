//! Sync specification: connection descriptors plus collection and merge
//! mappings.
//!
//! The specification is deserialized from a configuration file and checked
//! with [`SyncSpec::validate`] before any store connection is made. After
//! that it is immutable for the duration of a run.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::document::{KEY_FIELD, MAIN_ALIAS};
use crate::error::ConfigurationError;
use crate::order::{order_units, DependencyUnit};

/// Complete description of one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSpec {
    pub source: SourceConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub collections: Vec<CollectionMapping>,
    #[serde(default)]
    pub merges: Vec<MergeMapping>,
}

/// Document store (ArangoDB) connection descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub use_tls: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8529,
            user: "root".to_string(),
            password: String::new(),
            database: String::new(),
            use_tls: false,
        }
    }
}

impl SourceConfig {
    /// Base URL of the HTTP API.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Relational store connection descriptor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Connection string, e.g. `sqlite:data/warehouse.db`.
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Schema used to qualify target tables that are not already qualified.
    pub schema: Option<String>,
}

/// Maps every document of one collection onto rows of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMapping {
    pub collection: String,
    pub table: String,
    #[serde(default = "default_key_field")]
    pub key_field: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Field path to column name.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Tables that must be populated before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl DependencyUnit for CollectionMapping {
    fn unit_name(&self) -> &str {
        &self.table
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

fn default_key_field() -> String {
    KEY_FIELD.to_string()
}

fn default_key_column() -> String {
    "id".to_string()
}

/// Joins a main collection with other documents and writes one row per
/// main document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeMapping {
    pub name: String,
    pub target_table: String,
    pub main_collection: String,
    /// Alias-qualified path (`alias.field`) producing the row key.
    pub key_field: String,
    pub key_column: String,
    /// Alias-qualified field path to column name.
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
}

/// One join of a merge mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawJoinSpec", into = "RawJoinSpec")]
pub struct JoinSpec {
    pub alias: String,
    /// A required join that finds nothing excludes the main document.
    pub required: bool,
    pub strategy: JoinStrategy,
}

/// How a join locates its document.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinStrategy {
    /// First document in `collection` whose `foreign_field` equals the value
    /// at `local_field` (an alias-qualified path).
    Lookup {
        collection: String,
        local_field: String,
        foreign_field: String,
    },
    /// Walks edge collections from the main document's handle, then fetches
    /// the final document. When `collection` is set, the final document must
    /// belong to it.
    EdgeChain {
        steps: Vec<EdgeStep>,
        collection: Option<String>,
    },
}

/// One hop of an edge chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeStep {
    pub collection: String,
    pub direction: Direction,
}

/// Direction in which an edge is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Match the edge's `_from`, continue at its `_to`.
    #[serde(alias = "outbound")]
    Forward,
    /// Match the edge's `_to`, continue at its `_from`.
    #[serde(alias = "inbound")]
    Reverse,
}

impl Direction {
    /// Endpoint field matched against the current handle.
    pub fn source_field(self) -> &'static str {
        match self {
            Direction::Forward => "_from",
            Direction::Reverse => "_to",
        }
    }

    /// Endpoint field holding the next handle.
    pub fn target_field(self) -> &'static str {
        match self {
            Direction::Forward => "_to",
            Direction::Reverse => "_from",
        }
    }
}

/// Flat form of [`JoinSpec`] as written in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawJoinSpec {
    alias: String,
    #[serde(default = "default_required")]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    local_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    foreign_field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    edges: Vec<EdgeStep>,
}

fn default_required() -> bool {
    true
}

impl TryFrom<RawJoinSpec> for JoinSpec {
    type Error = ConfigurationError;

    fn try_from(raw: RawJoinSpec) -> Result<Self, Self::Error> {
        let lookup = raw.local_field.is_some() || raw.foreign_field.is_some();
        let strategy = match (lookup, raw.edges.is_empty()) {
            (true, false) => {
                return Err(ConfigurationError::Invalid(format!(
                    "Join '{}' declares both a lookup and an edge chain",
                    raw.alias
                )))
            }
            (true, true) => JoinStrategy::Lookup {
                collection: raw.collection.unwrap_or_default(),
                local_field: raw.local_field.unwrap_or_default(),
                foreign_field: raw.foreign_field.unwrap_or_default(),
            },
            (false, false) => JoinStrategy::EdgeChain {
                steps: raw.edges,
                collection: raw.collection.filter(|c| !c.trim().is_empty()),
            },
            (false, true) => {
                return Err(ConfigurationError::Invalid(format!(
                    "Join '{}' must declare local_field/foreign_field or edges",
                    raw.alias
                )))
            }
        };
        Ok(JoinSpec {
            alias: raw.alias,
            required: raw.required,
            strategy,
        })
    }
}

impl From<JoinSpec> for RawJoinSpec {
    fn from(join: JoinSpec) -> Self {
        let mut raw = RawJoinSpec {
            alias: join.alias,
            required: join.required,
            collection: None,
            local_field: None,
            foreign_field: None,
            edges: Vec::new(),
        };
        match join.strategy {
            JoinStrategy::Lookup {
                collection,
                local_field,
                foreign_field,
            } => {
                raw.collection = Some(collection);
                raw.local_field = Some(local_field);
                raw.foreign_field = Some(foreign_field);
            }
            JoinStrategy::EdgeChain { steps, collection } => {
                raw.edges = steps;
                raw.collection = collection;
            }
        }
        raw
    }
}

/// Whether a collection holds documents or edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Document,
    Edge,
}

/// A collection the run reads from, with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRequirement {
    pub name: String,
    pub kind: CollectionKind,
}

impl SyncSpec {
    /// Checks every structural invariant of the specification.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.source.database.trim().is_empty() {
            return Err(missing("source", "database"));
        }
        if self.target.url.trim().is_empty() {
            return Err(missing("target", "url"));
        }

        let mut tables: HashSet<String> = HashSet::new();
        for mapping in &self.collections {
            mapping.validate()?;
            if !tables.insert(mapping.table.to_lowercase()) {
                return Err(ConfigurationError::Duplicate {
                    kind: "table mapping",
                    name: mapping.table.clone(),
                });
            }
        }

        for mapping in &self.collections {
            for dependency in &mapping.depends_on {
                let dependency = dependency.trim();
                if dependency.is_empty() {
                    return Err(ConfigurationError::Invalid(format!(
                        "Dependencies for table {} must not contain blank entries",
                        mapping.table
                    )));
                }
                if dependency.eq_ignore_ascii_case(&mapping.table) {
                    return Err(ConfigurationError::SelfDependency(mapping.table.clone()));
                }
                if !tables.contains(&dependency.to_lowercase()) {
                    return Err(ConfigurationError::UnknownDependency {
                        table: mapping.table.clone(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }
        order_units(&self.collections)?;

        let mut names = HashSet::new();
        let mut targets = HashSet::new();
        for merge in &self.merges {
            merge.validate()?;
            if !names.insert(merge.name.clone()) {
                return Err(ConfigurationError::Duplicate {
                    kind: "merge mapping",
                    name: merge.name.clone(),
                });
            }
            if !targets.insert(merge.target_table.to_lowercase()) {
                return Err(ConfigurationError::Duplicate {
                    kind: "merge target table",
                    name: merge.target_table.clone(),
                });
            }
        }

        Ok(())
    }

    /// Collection mappings in dependency order.
    pub fn ordered_collections(&self) -> Result<Vec<&CollectionMapping>, ConfigurationError> {
        order_units(&self.collections)
    }

    /// Every collection read by the run, edge collections included, in first
    /// reference order.
    pub fn required_collections(&self) -> Vec<CollectionRequirement> {
        let mut seen: HashMap<String, CollectionKind> = HashMap::new();
        let mut required = Vec::new();
        let mut add = |name: &str, kind: CollectionKind| {
            let name = name.trim();
            if name.is_empty() || seen.contains_key(name) {
                return;
            }
            seen.insert(name.to_string(), kind);
            required.push(CollectionRequirement {
                name: name.to_string(),
                kind,
            });
        };

        for mapping in &self.collections {
            add(&mapping.collection, CollectionKind::Document);
        }
        for merge in &self.merges {
            add(&merge.main_collection, CollectionKind::Document);
            for join in &merge.joins {
                match &join.strategy {
                    JoinStrategy::Lookup { collection, .. } => {
                        add(collection, CollectionKind::Document)
                    }
                    JoinStrategy::EdgeChain { steps, collection } => {
                        for step in steps {
                            add(&step.collection, CollectionKind::Edge);
                        }
                        if let Some(collection) = collection {
                            add(collection, CollectionKind::Document);
                        }
                    }
                }
            }
        }
        required
    }
}

impl CollectionMapping {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let context = format!("collection mapping '{}'", self.collection);
        require(&context, "collection", &self.collection)?;
        require(&context, "table", &self.table)?;
        require(&context, "key_field", &self.key_field)?;
        require(&context, "key_column", &self.key_column)?;
        for (source, column) in &self.fields {
            if source.trim().is_empty() || source.split('.').any(str::is_empty) {
                return Err(ConfigurationError::InvalidPath {
                    context,
                    path: source.clone(),
                });
            }
            require(&context, "fields column", column)?;
        }
        distinct_columns(&context, &self.fields)?;
        Ok(())
    }
}

impl MergeMapping {
    fn validate(&self) -> Result<(), ConfigurationError> {
        require("merge mapping", "name", &self.name)?;
        let context = format!("merge mapping '{}'", self.name);
        if !is_identifier(&self.name) {
            return Err(ConfigurationError::InvalidIdentifier {
                context,
                name: self.name.clone(),
            });
        }
        require(&context, "target_table", &self.target_table)?;
        require(&context, "main_collection", &self.main_collection)?;
        require(&context, "key_column", &self.key_column)?;
        require(&context, "key_field", &self.key_field)?;
        if !is_alias_path(&self.key_field) {
            return Err(ConfigurationError::InvalidPath {
                context,
                path: self.key_field.clone(),
            });
        }
        if self.fields.is_empty() {
            return Err(missing(&context, "fields"));
        }
        for (source, column) in &self.fields {
            if !is_alias_path(source) {
                return Err(ConfigurationError::InvalidPath {
                    context,
                    path: source.clone(),
                });
            }
            require(&context, "fields column", column)?;
        }
        distinct_columns(&context, &self.fields)?;
        if !self.fields.contains_key(&self.key_field) {
            return Err(ConfigurationError::Invalid(format!(
                "Merge mapping {} must map key_field {} to a target column",
                self.name, self.key_field
            )));
        }

        let mut aliases: HashSet<String> = HashSet::new();
        for join in &self.joins {
            join.validate(&self.name)?;
            if !aliases.insert(join.alias.clone()) {
                return Err(ConfigurationError::Duplicate {
                    kind: "join alias",
                    name: format!("{} in merge {}", join.alias, self.name),
                });
            }
        }
        Ok(())
    }
}

impl JoinSpec {
    fn validate(&self, merge: &str) -> Result<(), ConfigurationError> {
        let context = format!("join '{}' in merge {}", self.alias, merge);
        require(&context, "alias", &self.alias)?;
        if !is_identifier(&self.alias) {
            return Err(ConfigurationError::InvalidIdentifier {
                context,
                name: self.alias.clone(),
            });
        }
        if self.alias.eq_ignore_ascii_case(MAIN_ALIAS) {
            return Err(ConfigurationError::Invalid(format!(
                "Join alias cannot be '{}' in merge {}",
                MAIN_ALIAS, merge
            )));
        }
        match &self.strategy {
            JoinStrategy::Lookup {
                collection,
                local_field,
                foreign_field,
            } => {
                require(&context, "collection", collection)?;
                require(&context, "local_field", local_field)?;
                if !is_alias_path(local_field) {
                    return Err(ConfigurationError::InvalidPath {
                        context,
                        path: local_field.clone(),
                    });
                }
                require(&context, "foreign_field", foreign_field)?;
                if !foreign_field.split('.').all(is_identifier) {
                    return Err(ConfigurationError::InvalidPath {
                        context,
                        path: foreign_field.clone(),
                    });
                }
            }
            JoinStrategy::EdgeChain { steps, .. } => {
                if steps.is_empty() {
                    return Err(missing(&context, "edges"));
                }
                for step in steps {
                    require(&context, "edges collection", &step.collection)?;
                }
            }
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `alias.segment(.segment)*` where the alias is an identifier.
pub fn is_alias_path(path: &str) -> bool {
    let mut parts = path.split('.');
    let alias_ok = parts.next().map(is_identifier).unwrap_or(false);
    let rest: Vec<&str> = parts.collect();
    alias_ok
        && !rest.is_empty()
        && rest
            .iter()
            .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Each target column may be written by one source path only.
fn distinct_columns(
    context: &str,
    fields: &BTreeMap<String, String>,
) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for column in fields.values() {
        if !seen.insert(column.trim().to_lowercase()) {
            return Err(ConfigurationError::Duplicate {
                kind: "target column",
                name: format!("{} in {}", column.trim(), context),
            });
        }
    }
    Ok(())
}

fn require(context: &str, field: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(missing(context, field));
    }
    Ok(())
}

fn missing(context: &str, field: &'static str) -> ConfigurationError {
    ConfigurationError::MissingField {
        context: context.to_string(),
        field,
    }
}
