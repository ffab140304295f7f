//! Raw config types matching the JSON entity/relation files.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s.as_str(),
            ColumnTypeConfig::Parameterized { name, .. } => name.as_str(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Any non-null value marks the column as having a database default.
    #[serde(default)]
    pub default: Option<Value>,
}

/// Column that gates every query (`is_active = 1` by default).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActiveFlagConfig {
    #[serde(default = "default_active_column")]
    pub column: String,
    #[serde(default = "default_active_value")]
    pub value: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortConfig {
    pub column: String,
    #[serde(default = "default_direction")]
    pub direction: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    pub path_segment: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default = "default_created_at")]
    pub created_at: String,
    #[serde(default = "default_updated_at")]
    pub updated_at: String,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    /// Extra columns accepted in dynamic filters (primary key and timestamps are implied).
    #[serde(default)]
    pub filterable_fields: Vec<String>,
    #[serde(default)]
    pub active_flag: Option<ActiveFlagConfig>,
    /// Sort used when the request has no usable `sort` directive. Defaults to primary key desc.
    #[serde(default)]
    pub default_sort: Option<SortConfig>,
    /// Relation names that may be counted via `count=` / `with_count=`.
    #[serde(default)]
    pub aggregates: Vec<String>,
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    /// Column names that must never be exposed in API responses (e.g. password hashes).
    #[serde(default)]
    pub sensitive_columns: Vec<String>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// One related row (belongs-to / has-one).
    ToOne,
    /// Many related rows (has-many).
    ToMany,
}

/// `name` is the accessor used in `include=` (camelCase, e.g. `createdByUser`).
/// Related rows match when `to.foreign_key = from.local_key`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub id: String,
    pub name: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub kind: RelationKind,
    pub local_key: String,
    pub foreign_key: String,
}

/// All config in one struct for in-memory loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "public".into()
}

fn default_primary_key() -> String {
    "id".into()
}

fn default_created_at() -> String {
    "created_at".into()
}

fn default_updated_at() -> String {
    "updated_at".into()
}

fn default_active_column() -> String {
    "is_active".into()
}

fn default_active_value() -> Value {
    Value::from(1)
}

fn default_direction() -> String {
    "desc".into()
}

fn default_page_size() -> u64 {
    25
}

fn default_operations() -> Vec<String> {
    ["create", "read", "update", "delete", "bulk_create"]
        .into_iter()
        .map(String::from)
        .collect()
}
