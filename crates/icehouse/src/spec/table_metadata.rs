use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PartitionSpec, Schema, Snapshot, SnapshotReference, SortOrder};
use crate::catalog::rest::ErrorModel;

/// Name of the branch that tracks the current snapshot.
pub const MAIN_BRANCH: &str = "main";

/// Records a change of the current snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotLogEntry {
    pub timestamp_ms: i64,
    pub snapshot_id: i64,
}

/// Records the creation of a metadata file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataLogEntry {
    pub timestamp_ms: i64,
    pub metadata_file: String,
}

/// The on-disk table metadata document. Immutable once written; commits
/// produce a new document at a new content-addressed location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub format_version: i32,
    pub table_uuid: Uuid,
    pub location: String,
    pub last_updated_ms: i64,
    pub last_column_id: i32,
    pub schemas: Vec<Schema>,
    pub current_schema_id: i32,
    #[serde(default)]
    pub partition_specs: Vec<PartitionSpec>,
    #[serde(default)]
    pub default_spec_id: i32,
    #[serde(default)]
    pub last_partition_id: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_snapshot_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<Snapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshot_log: Vec<SnapshotLogEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata_log: Vec<MetadataLogEntry>,
    #[serde(default)]
    pub sort_orders: Vec<SortOrder>,
    #[serde(default)]
    pub default_sort_order_id: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refs: BTreeMap<String, SnapshotReference>,
}

impl TableMetadata {
    #[must_use]
    pub fn schema_by_id(&self, schema_id: i32) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == Some(schema_id))
    }

    #[must_use]
    pub fn snapshot_by_id(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .find(|s| s.snapshot_id == snapshot_id)
    }

    /// Highest field id across all schemas.
    #[must_use]
    pub fn max_schema_field_id(&self) -> i32 {
        self.schemas
            .iter()
            .map(Schema::max_field_id)
            .max()
            .unwrap_or(0)
    }

    /// Checks the structural invariants that must hold after every commit.
    ///
    /// Empty partition-spec and sort-order lists admit the default id 0 of
    /// freshly created tables.
    pub fn validate(&self) -> Result<(), ErrorModel> {
        if self.schema_by_id(self.current_schema_id).is_none() {
            return Err(ErrorModel::commit_failed(format!(
                "Current schema id {} is not present in schemas.",
                self.current_schema_id
            )));
        }
        if !self.partition_specs.is_empty()
            && !self
                .partition_specs
                .iter()
                .any(|spec| spec.spec_id == self.default_spec_id)
        {
            return Err(ErrorModel::commit_failed(format!(
                "Default partition spec id {} is not present in partition specs.",
                self.default_spec_id
            )));
        }
        if !self.sort_orders.is_empty()
            && !self
                .sort_orders
                .iter()
                .any(|order| order.order_id == self.default_sort_order_id)
        {
            return Err(ErrorModel::commit_failed(format!(
                "Default sort order id {} is not present in sort orders.",
                self.default_sort_order_id
            )));
        }
        if let Some(snapshot_id) = self.current_snapshot_id {
            if self.snapshot_by_id(snapshot_id).is_none() {
                return Err(ErrorModel::commit_failed(format!(
                    "Current snapshot id {snapshot_id} is not present in snapshots."
                )));
            }
        }
        let max_field_id = self.max_schema_field_id();
        if self.last_column_id < max_field_id {
            return Err(ErrorModel::commit_failed(format!(
                "last-column-id {} is below the highest assigned field id {max_field_id}.",
                self.last_column_id
            )));
        }
        let max_partition_field_id = self
            .partition_specs
            .iter()
            .map(PartitionSpec::max_field_id)
            .max()
            .unwrap_or(0);
        if self.last_partition_id < max_partition_field_id {
            return Err(ErrorModel::commit_failed(format!(
                "last-partition-id {} is below the highest assigned partition field id {max_partition_field_id}.",
                self.last_partition_id
            )));
        }
        for (name, reference) in &self.refs {
            if self.snapshot_by_id(reference.snapshot_id).is_none() {
                return Err(ErrorModel::commit_failed(format!(
                    "Ref '{name}' points at snapshot {} which is not present in snapshots.",
                    reference.snapshot_id
                )));
            }
        }
        Ok(())
    }
}
