use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::impl_into_response;
use crate::spec::{
    PartitionSpec, Schema, Snapshot, SnapshotRefType, SortOrder, TableMetadata,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIdent {
    pub namespace: Vec<String>,
    pub name: String,
}

impl TableIdent {
    #[must_use]
    pub fn new(namespace: Vec<String>, name: impl Into<String>) -> Self {
        TableIdent {
            namespace,
            name: name.into(),
        }
    }
}

impl Display for TableIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for level in &self.namespace {
            write!(f, "{level}.")?;
        }
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateTableRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub schema: Schema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_spec: Option<PartitionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_order: Option<SortOrder>,
    #[serde(default)]
    pub stage_create: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegisterTableRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub metadata_location: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RenameTableRequest {
    pub source: TableIdent,
    pub destination: TableIdent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListTablesResponse {
    pub identifiers: Vec<TableIdent>,
}

/// Result used when a table is loaded or created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadTableResult {
    pub metadata_location: Option<String>,
    pub metadata: TableMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitTableRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<TableIdent>,
    #[serde(default)]
    pub requirements: Vec<TableRequirement>,
    pub updates: Vec<TableUpdate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitTableResponse {
    pub metadata_location: String,
    pub metadata: TableMetadata,
}

/// A precondition asserted over the current metadata before updates apply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TableRequirement {
    AssertCreate,
    /// The uuid stays a plain string: a mismatching (even malformed) value
    /// must surface as a failed requirement, not as a parse error.
    AssertTableUuid {
        uuid: String,
    },
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSpecId {
        default_spec_id: i32,
    },
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSortOrderId {
        default_sort_order_id: i32,
    },
    #[serde(rename_all = "kebab-case")]
    AssertCurrentSchemaId {
        current_schema_id: i32,
    },
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedFieldId {
        last_assigned_field_id: i32,
    },
    #[serde(rename_all = "kebab-case")]
    AssertRefSnapshotId {
        r#ref: String,
        snapshot_id: Option<i64>,
    },
}

/// A typed mutation of the table metadata. Updates apply in request order;
/// the order is significant (`AddSchema` must precede a `SetCurrentSchema`
/// referencing it in the same commit).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum TableUpdate {
    AssignUuid {
        uuid: Uuid,
    },
    #[serde(rename_all = "kebab-case")]
    UpgradeFormatVersion {
        format_version: i32,
    },
    #[serde(rename_all = "kebab-case")]
    AddSchema {
        schema: Schema,
        last_assigned_field_id: Option<i32>,
    },
    #[serde(rename_all = "kebab-case")]
    SetCurrentSchema {
        schema_id: i32,
    },
    #[serde(rename = "add-spec")]
    AddPartitionSpec {
        spec: PartitionSpec,
    },
    #[serde(rename_all = "kebab-case")]
    SetDefaultSpec {
        spec_id: i32,
    },
    #[serde(rename_all = "kebab-case")]
    AddSortOrder {
        sort_order: SortOrder,
    },
    #[serde(rename_all = "kebab-case")]
    SetDefaultSortOrder {
        sort_order_id: i32,
    },
    AddSnapshot {
        snapshot: Snapshot,
    },
    #[serde(rename_all = "kebab-case")]
    SetSnapshotRef {
        ref_name: String,
        #[serde(rename = "type")]
        ref_type: SnapshotRefType,
        snapshot_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_snapshots_to_keep: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_snapshot_age_ms: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_ref_age_ms: Option<i64>,
    },
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshotRef {
        ref_name: String,
    },
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshots {
        snapshot_ids: Vec<i64>,
    },
    SetProperties {
        updates: BTreeMap<String, String>,
    },
    RemoveProperties {
        removals: Vec<String>,
    },
    SetLocation {
        location: String,
    },
}

impl_into_response!(ListTablesResponse);
impl_into_response!(LoadTableResult);
impl_into_response!(CommitTableResponse);
