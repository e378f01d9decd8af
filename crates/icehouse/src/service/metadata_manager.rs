use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    catalog::rest::{ErrorModel, TableUpdate},
    spec::{
        MAIN_BRANCH, MetadataLogEntry, PartitionSpec, Schema, SnapshotLogEntry, SnapshotReference,
        SortOrder, TableMetadata,
    },
};

fn wall_clock_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Builds initial table metadata, applies commit updates and generates
/// versioned metadata file names.
///
/// Carries its clock as a function pointer so tests can pin timestamps.
#[derive(Clone, Copy, Debug)]
pub struct MetadataManager {
    now_ms: fn() -> i64,
}

impl Default for MetadataManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataManager {
    #[must_use]
    pub fn new() -> Self {
        MetadataManager {
            now_ms: wall_clock_ms,
        }
    }

    #[must_use]
    pub fn with_clock(now_ms: fn() -> i64) -> Self {
        MetadataManager { now_ms }
    }

    fn now_ms(&self) -> i64 {
        (self.now_ms)()
    }

    /// `{location}/metadata/{VVVVV}-{uuid}.metadata.json`, where the version
    /// counter is parsed from the old file name and incremented. The embedded
    /// uuid keeps concurrent commits from colliding on the file name even
    /// when both read the same old location; linearization comes from the
    /// catalog CAS, never from file names.
    #[must_use]
    pub fn generate_new_metadata_location(
        &self,
        table_location: &str,
        old_metadata_location: Option<&str>,
    ) -> String {
        let version = old_metadata_location
            .and_then(|old| {
                let filename = old.rsplit('/').next().unwrap_or(old);
                filename.split('-').next()?.parse::<u64>().ok()
            })
            .map_or(0, |v| v + 1);
        format!(
            "{}/metadata/{version:05}-{}.metadata.json",
            table_location.trim_end_matches('/'),
            Uuid::new_v4()
        )
    }

    /// Returns the initial metadata of a fresh table and the location of its
    /// first metadata file.
    #[must_use]
    pub fn build_initial_table_metadata(
        &self,
        schema: &Schema,
        partition_spec: Option<&PartitionSpec>,
        sort_order: Option<&SortOrder>,
        properties: Option<&BTreeMap<String, String>>,
        table_location: &str,
    ) -> (TableMetadata, String) {
        let mut schema = schema.clone();
        let schema_id = schema.schema_id.unwrap_or(0);
        schema.schema_id = Some(schema_id);
        let last_column_id = schema.max_field_id();

        let (partition_specs, default_spec_id, last_partition_id) = match partition_spec {
            Some(spec) => (vec![spec.clone()], spec.spec_id, spec.max_field_id()),
            None => (Vec::new(), 0, 0),
        };
        let (sort_orders, default_sort_order_id) = match sort_order {
            Some(order) => (vec![order.clone()], order.order_id),
            None => (Vec::new(), 0),
        };

        let now = self.now_ms();
        let metadata_location = self.generate_new_metadata_location(table_location, None);

        let metadata = TableMetadata {
            format_version: 1,
            table_uuid: Uuid::new_v4(),
            location: table_location.to_string(),
            last_updated_ms: now,
            last_column_id,
            schemas: vec![schema],
            current_schema_id: schema_id,
            partition_specs,
            default_spec_id,
            last_partition_id,
            properties: properties.cloned().unwrap_or_default(),
            current_snapshot_id: None,
            snapshots: Vec::new(),
            snapshot_log: Vec::new(),
            metadata_log: vec![MetadataLogEntry {
                timestamp_ms: now,
                metadata_file: metadata_location.clone(),
            }],
            sort_orders,
            default_sort_order_id,
            refs: BTreeMap::new(),
        };

        (metadata, metadata_location)
    }

    /// Applies `updates` in order to a deep copy of `current` and returns the
    /// new metadata; the input is never mutated, even when a later update
    /// fails mid-sequence. The produced metadata has passed invariant
    /// validation.
    ///
    /// `override_location` (the first `SetLocation` of the commit) wins over
    /// the location carried by any individual `SetLocation` update.
    pub fn apply_updates(
        &self,
        current: &TableMetadata,
        updates: &[TableUpdate],
        override_location: Option<&str>,
    ) -> Result<TableMetadata, ErrorModel> {
        let mut new = current.clone();
        new.last_updated_ms = self.now_ms();

        for update in updates {
            match update {
                TableUpdate::AssignUuid { uuid } => {
                    new.table_uuid = *uuid;
                }
                TableUpdate::UpgradeFormatVersion { format_version } => {
                    if *format_version < new.format_version {
                        return Err(ErrorModel::commit_failed(format!(
                            "Cannot downgrade format version from {} to {format_version}",
                            new.format_version
                        )));
                    }
                    new.format_version = *format_version;
                }
                TableUpdate::AddSchema {
                    schema,
                    last_assigned_field_id,
                } => {
                    if new
                        .schemas
                        .iter()
                        .any(|s| s.schema_id == schema.schema_id)
                    {
                        return Err(ErrorModel::commit_failed(format!(
                            "Schema with id {:?} already exists.",
                            schema.schema_id
                        )));
                    }
                    new.last_column_id = new.last_column_id.max(schema.max_field_id());
                    if let Some(last_assigned) = last_assigned_field_id {
                        new.last_column_id = new.last_column_id.max(*last_assigned);
                    }
                    new.schemas.push(schema.clone());
                }
                TableUpdate::SetCurrentSchema { schema_id } => {
                    if new.schema_by_id(*schema_id).is_none() {
                        return Err(ErrorModel::commit_failed(format!(
                            "Schema with id {schema_id} not found in existing schemas."
                        )));
                    }
                    new.current_schema_id = *schema_id;
                }
                TableUpdate::AddPartitionSpec { spec } => {
                    if new
                        .partition_specs
                        .iter()
                        .any(|existing| existing.spec_id == spec.spec_id)
                    {
                        return Err(ErrorModel::commit_failed(format!(
                            "Partition spec with id {} already exists.",
                            spec.spec_id
                        )));
                    }
                    new.last_partition_id = new.last_partition_id.max(spec.max_field_id());
                    new.partition_specs.push(spec.clone());
                }
                TableUpdate::SetDefaultSpec { spec_id } => {
                    if !new
                        .partition_specs
                        .iter()
                        .any(|spec| spec.spec_id == *spec_id)
                    {
                        return Err(ErrorModel::commit_failed(format!(
                            "Partition spec with id {spec_id} not found."
                        )));
                    }
                    new.default_spec_id = *spec_id;
                }
                TableUpdate::AddSortOrder { sort_order } => {
                    if new
                        .sort_orders
                        .iter()
                        .any(|existing| existing.order_id == sort_order.order_id)
                    {
                        return Err(ErrorModel::commit_failed(format!(
                            "Sort order with id {} already exists.",
                            sort_order.order_id
                        )));
                    }
                    new.sort_orders.push(sort_order.clone());
                }
                TableUpdate::SetDefaultSortOrder { sort_order_id } => {
                    if !new
                        .sort_orders
                        .iter()
                        .any(|order| order.order_id == *sort_order_id)
                    {
                        return Err(ErrorModel::commit_failed(format!(
                            "Sort order with id {sort_order_id} not found."
                        )));
                    }
                    new.default_sort_order_id = *sort_order_id;
                }
                TableUpdate::AddSnapshot { snapshot } => {
                    new.current_snapshot_id = Some(snapshot.snapshot_id);
                    new.snapshot_log.push(SnapshotLogEntry {
                        timestamp_ms: snapshot.timestamp_ms,
                        snapshot_id: snapshot.snapshot_id,
                    });
                    new.refs.insert(
                        MAIN_BRANCH.to_string(),
                        SnapshotReference::branch(snapshot.snapshot_id),
                    );
                    new.snapshots.push(snapshot.clone());
                }
                TableUpdate::SetSnapshotRef {
                    ref_name,
                    ref_type,
                    snapshot_id,
                    min_snapshots_to_keep,
                    max_snapshot_age_ms,
                    max_ref_age_ms,
                } => {
                    if new.snapshot_by_id(*snapshot_id).is_none() {
                        return Err(ErrorModel::commit_failed(format!(
                            "Snapshot with id {snapshot_id} not found; cannot set ref '{ref_name}'."
                        )));
                    }
                    new.refs.insert(
                        ref_name.clone(),
                        SnapshotReference {
                            snapshot_id: *snapshot_id,
                            ref_type: *ref_type,
                            min_snapshots_to_keep: *min_snapshots_to_keep,
                            max_snapshot_age_ms: *max_snapshot_age_ms,
                            max_ref_age_ms: *max_ref_age_ms,
                        },
                    );
                }
                TableUpdate::RemoveSnapshotRef { ref_name } => {
                    new.refs.remove(ref_name);
                }
                TableUpdate::RemoveSnapshots { snapshot_ids } => {
                    new.snapshots
                        .retain(|snapshot| !snapshot_ids.contains(&snapshot.snapshot_id));
                    if new
                        .current_snapshot_id
                        .is_some_and(|id| snapshot_ids.contains(&id))
                    {
                        new.current_snapshot_id = None;
                    }
                    new.refs
                        .retain(|_, reference| !snapshot_ids.contains(&reference.snapshot_id));
                }
                TableUpdate::SetProperties { updates } => {
                    new.properties
                        .extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                TableUpdate::RemoveProperties { removals } => {
                    for key in removals {
                        new.properties.remove(key);
                    }
                }
                TableUpdate::SetLocation { location } => {
                    new.location = override_location.unwrap_or(location).to_string();
                }
            }
        }

        new.validate()?;
        Ok(new)
    }
}
