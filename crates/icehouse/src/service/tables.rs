use std::{collections::BTreeMap, path::Path};

use itertools::Itertools;

use crate::{
    catalog::rest::{
        CommitTableRequest, CommitTableResponse, CreateTableRequest, ErrorModel,
        ListTablesResponse, LoadTableResult, RegisterTableRequest, RenameTableRequest, TableIdent,
        TableRequirement, TableUpdate,
    },
    implementations::sqlite::{namespace as namespace_store, table as table_store},
    service::ApiContext,
    spec::{MetadataLogEntry, Schema, TableMetadata},
};

fn default_table_location(warehouse_root: &Path, namespace: &[String], name: &str) -> String {
    let mut location = warehouse_root.to_path_buf();
    for level in namespace {
        location.push(level);
    }
    location.push(name);
    location.display().to_string()
}

fn created_by_config(key: &str) -> Option<BTreeMap<String, String>> {
    Some(
        [(key.to_string(), "rest-catalog".to_string())]
            .into_iter()
            .collect(),
    )
}

pub async fn list_tables(
    context: &ApiContext,
    namespace: &[String],
) -> Result<ListTablesResponse, ErrorModel> {
    let namespace_row = namespace_store::get_namespace(namespace, context.catalog.pool())
        .await?
        .ok_or_else(|| ErrorModel::no_such_namespace(namespace))?;
    let tables = table_store::list_tables(namespace_row.id, context.catalog.pool()).await?;
    Ok(ListTablesResponse {
        identifiers: tables
            .into_iter()
            .map(|table| TableIdent::new(namespace.to_vec(), table.name))
            .collect(),
    })
}

pub async fn table_exists(
    context: &ApiContext,
    namespace: &[String],
    name: &str,
) -> Result<(), ErrorModel> {
    table_store::get_table(namespace, name, context.catalog.pool())
        .await?
        .map(|_| ())
        .ok_or_else(|| ErrorModel::no_such_table(namespace, name))
}

pub async fn create_table(
    context: &ApiContext,
    namespace: &[String],
    request: CreateTableRequest,
) -> Result<LoadTableResult, ErrorModel> {
    let namespace_row = namespace_store::get_namespace(namespace, context.catalog.pool())
        .await?
        .ok_or_else(|| ErrorModel::no_such_namespace(namespace))?;

    let table_location = request.location.clone().unwrap_or_else(|| {
        default_table_location(context.storage.warehouse_root(), namespace, &request.name)
    });

    let (metadata, metadata_location) = context.metadata.build_initial_table_metadata(
        &request.schema,
        request.partition_spec.as_ref(),
        request.write_order.as_ref(),
        request.properties.as_ref(),
        &table_location,
    );

    if !request.stage_create {
        context
            .storage
            .write_json(&metadata_location, &metadata)
            .await?;
        if let Err(e) = table_store::create_table(
            namespace,
            namespace_row.id,
            &request.name,
            &metadata_location,
            None,
            context.catalog.pool(),
        )
        .await
        {
            rollback_metadata_file(context, &metadata_location).await;
            return Err(e);
        }
    }

    Ok(LoadTableResult {
        metadata_location: Some(metadata_location),
        metadata,
        config: created_by_config("created-by"),
    })
}

/// Infers the table name from the metadata location when the request does
/// not carry one: the metadata file's grandparent directory (its parent is
/// conventionally `metadata/`).
fn infer_table_name(request: &RegisterTableRequest) -> Result<String, ErrorModel> {
    if let Some(name) = &request.name {
        if !name.is_empty() {
            return Ok(name.clone());
        }
    }
    let location = Path::new(&request.metadata_location);
    let mut directory = location.parent();
    if let Some(parent) = directory {
        if parent.file_name().is_some_and(|n| n == "metadata") {
            directory = parent.parent();
        }
    }
    directory
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ErrorModel::validation(
                "Table name must be provided or inferable from the metadata location.",
            )
        })
}

pub async fn register_table(
    context: &ApiContext,
    namespace: &[String],
    request: RegisterTableRequest,
) -> Result<LoadTableResult, ErrorModel> {
    let name = infer_table_name(&request)?;

    let namespace_row = namespace_store::get_namespace(namespace, context.catalog.pool())
        .await?
        .ok_or_else(|| ErrorModel::no_such_namespace(namespace))?;

    if !context.storage.exists(&request.metadata_location).await? {
        return Err(ErrorModel::validation(format!(
            "Metadata file for registration does not exist at: {}",
            request.metadata_location
        )));
    }

    let row = table_store::create_table(
        namespace,
        namespace_row.id,
        &name,
        &request.metadata_location,
        None,
        context.catalog.pool(),
    )
    .await?;

    let metadata: TableMetadata = context.storage.read_json(&row.metadata_location).await?;
    Ok(LoadTableResult {
        metadata_location: Some(row.metadata_location),
        metadata,
        config: created_by_config("registered-by"),
    })
}

pub async fn load_table(
    context: &ApiContext,
    namespace: &[String],
    name: &str,
    snapshot_ref: Option<&str>,
) -> Result<LoadTableResult, ErrorModel> {
    let row = table_store::get_table(namespace, name, context.catalog.pool())
        .await?
        .ok_or_else(|| ErrorModel::no_such_table(namespace, name))?;

    let mut metadata: TableMetadata = context.storage.read_json(&row.metadata_location).await?;

    if let Some(reference) = snapshot_ref {
        let target_snapshot_id = if let Some(named) = metadata.refs.get(reference) {
            named.snapshot_id
        } else if let Ok(id) = reference.parse::<i64>() {
            id
        } else {
            return Err(ErrorModel::no_such_table(
                namespace,
                &format!("{name}.ref:{reference}"),
            ));
        };

        let snapshot = metadata
            .snapshot_by_id(target_snapshot_id)
            .ok_or_else(|| {
                ErrorModel::commit_failed(format!(
                    "Snapshot ID {target_snapshot_id} referenced by '{reference}' not found in metadata."
                ))
            })?;
        let snapshot_schema_id = snapshot.schema_id;

        // Only the returned copy is re-pointed; the persisted metadata is
        // unchanged.
        metadata.current_snapshot_id = Some(target_snapshot_id);
        if let Some(schema_id) = snapshot_schema_id {
            metadata.current_schema_id = schema_id;
        }
    }

    Ok(LoadTableResult {
        metadata_location: Some(row.metadata_location),
        metadata,
        config: row.properties,
    })
}

fn check_requirement(
    requirement: &TableRequirement,
    current: &TableMetadata,
) -> Result<(), ErrorModel> {
    match requirement {
        TableRequirement::AssertCreate => Ok(()),
        TableRequirement::AssertTableUuid { uuid } => {
            if current.table_uuid.to_string() == *uuid {
                Ok(())
            } else {
                Err(ErrorModel::commit_failed(format!(
                    "Table UUID requirement failed. Expected: {uuid}, Found: {}",
                    current.table_uuid
                )))
            }
        }
        TableRequirement::AssertDefaultSpecId { default_spec_id } => {
            if current.default_spec_id == *default_spec_id {
                Ok(())
            } else {
                Err(ErrorModel::commit_failed(format!(
                    "Default spec id requirement failed. Expected: {default_spec_id}, Found: {}",
                    current.default_spec_id
                )))
            }
        }
        TableRequirement::AssertDefaultSortOrderId {
            default_sort_order_id,
        } => {
            if current.default_sort_order_id == *default_sort_order_id {
                Ok(())
            } else {
                Err(ErrorModel::commit_failed(format!(
                    "Default sort order id requirement failed. Expected: {default_sort_order_id}, Found: {}",
                    current.default_sort_order_id
                )))
            }
        }
        TableRequirement::AssertCurrentSchemaId { current_schema_id } => {
            if current.current_schema_id == *current_schema_id {
                Ok(())
            } else {
                Err(ErrorModel::commit_failed(format!(
                    "Current schema id requirement failed. Expected: {current_schema_id}, Found: {}",
                    current.current_schema_id
                )))
            }
        }
        TableRequirement::AssertLastAssignedFieldId {
            last_assigned_field_id,
        } => {
            if current.last_column_id == *last_assigned_field_id {
                Ok(())
            } else {
                Err(ErrorModel::commit_failed(format!(
                    "Last assigned field id requirement failed. Expected: {last_assigned_field_id}, Found: {}",
                    current.last_column_id
                )))
            }
        }
        TableRequirement::AssertRefSnapshotId { r#ref, snapshot_id } => {
            match (current.refs.get(r#ref), snapshot_id) {
                (None, None) => Ok(()),
                (Some(reference), Some(expected)) if reference.snapshot_id == *expected => Ok(()),
                (Some(reference), Some(expected)) => Err(ErrorModel::commit_failed(format!(
                    "Ref '{ref}' snapshot id requirement failed. Expected: {expected}, Found: {}",
                    reference.snapshot_id,
                    r#ref = r#ref
                ))),
                (Some(_), None) => Err(ErrorModel::commit_failed(format!(
                    "Ref '{ref}' was expected to be absent.",
                    r#ref = r#ref
                ))),
                (None, Some(expected)) => Err(ErrorModel::commit_failed(format!(
                    "Ref '{ref}' with snapshot id {expected} is absent.",
                    r#ref = r#ref
                ))),
            }
        }
    }
}

async fn rollback_metadata_file(context: &ApiContext, location: &str) {
    if let Err(e) = context.storage.delete(location).await {
        tracing::warn!("Failed to roll back metadata file {location}: {e}");
    }
}

pub async fn commit_table(
    context: &ApiContext,
    namespace: &[String],
    name: &str,
    request: CommitTableRequest,
) -> Result<CommitTableResponse, ErrorModel> {
    if let Some(identifier) = &request.identifier {
        if identifier.namespace != namespace || identifier.name != name {
            let path_identifier = TableIdent::new(namespace.to_vec(), name);
            return Err(ErrorModel::bad_request(format!(
                "Table identifier in path ('{path_identifier}') does not match identifier in request body ('{identifier}')."
            )));
        }
    }

    let assert_create = request
        .requirements
        .iter()
        .any(|requirement| matches!(requirement, TableRequirement::AssertCreate));

    let current_row = table_store::get_table(namespace, name, context.catalog.pool()).await?;

    if assert_create {
        if current_row.is_some() {
            return Err(ErrorModel::table_already_exists(namespace, name));
        }
        return commit_create_table(context, namespace, name, &request).await;
    }

    let Some(current_row) = current_row else {
        return Err(ErrorModel::no_such_table(namespace, name));
    };
    let old_location = current_row.metadata_location;

    let current: TableMetadata = context
        .storage
        .read_json(&old_location)
        .await
        .map_err(|e| {
            ErrorModel::commit_failed_with_reason(
                "Failed to load current metadata for commit.",
                e.message,
            )
        })?;

    for requirement in &request.requirements {
        check_requirement(requirement, &current)?;
    }

    let override_location = request.updates.iter().find_map(|update| match update {
        TableUpdate::SetLocation { location } => Some(location.as_str()),
        _ => None,
    });

    let mut new_metadata = context
        .metadata
        .apply_updates(&current, &request.updates, override_location)?;

    let new_location = context
        .metadata
        .generate_new_metadata_location(&new_metadata.location, Some(&old_location));
    new_metadata.metadata_log.push(MetadataLogEntry {
        timestamp_ms: new_metadata.last_updated_ms,
        metadata_file: new_location.clone(),
    });

    context.storage.write_json(&new_location, &new_metadata).await?;

    if let Err(e) = table_store::cas_update_metadata_location(
        namespace,
        name,
        &old_location,
        &new_location,
        context.catalog.pool(),
    )
    .await
    {
        // The lost race must not leave an orphan file behind.
        rollback_metadata_file(context, &new_location).await;
        return if e.r#type == "CommitFailedException" {
            Err(e)
        } else {
            Err(ErrorModel::commit_failed_with_reason(
                "Failed to update catalog database.",
                e.message,
            ))
        };
    }

    Ok(CommitTableResponse {
        metadata_location: new_location,
        metadata: new_metadata,
    })
}

/// The `AssertCreate` commit path: the first commit both builds the initial
/// metadata and creates the catalog row.
async fn commit_create_table(
    context: &ApiContext,
    namespace: &[String],
    name: &str,
    request: &CommitTableRequest,
) -> Result<CommitTableResponse, ErrorModel> {
    let mut schema: Option<&Schema> = None;
    let mut requested_location: Option<&str> = None;
    let mut properties: BTreeMap<String, String> = BTreeMap::new();
    for update in &request.updates {
        match update {
            TableUpdate::AddSchema { schema: added, .. } if schema.is_none() => {
                schema = Some(added);
            }
            TableUpdate::SetLocation { location } if requested_location.is_none() => {
                requested_location = Some(location);
            }
            TableUpdate::SetProperties { updates } => {
                properties.extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            _ => {}
        }
    }

    let Some(schema) = schema else {
        return Err(ErrorModel::bad_request(
            "CreateTable (via AssertCreate) requires an 'add-schema' update.",
        ));
    };

    let namespace_row = namespace_store::get_namespace(namespace, context.catalog.pool())
        .await?
        .ok_or_else(|| ErrorModel::no_such_namespace(namespace))?;

    let table_location = requested_location.map_or_else(
        || default_table_location(context.storage.warehouse_root(), namespace, name),
        ToString::to_string,
    );

    let (initial, new_location) = context.metadata.build_initial_table_metadata(
        schema,
        None,
        None,
        Some(&properties),
        &table_location,
    );

    // The extracted schema is already part of the initial metadata; applying
    // it again would trip the duplicate-schema check.
    let initial_schema_id = initial.current_schema_id;
    let remaining: Vec<TableUpdate> = request
        .updates
        .iter()
        .filter(|update| {
            !matches!(update, TableUpdate::AddSchema { schema, .. }
                if schema.schema_id.unwrap_or(0) == initial_schema_id)
        })
        .cloned()
        .collect();

    let mut metadata = context.metadata.apply_updates(&initial, &remaining, None)?;
    metadata.metadata_log = vec![MetadataLogEntry {
        timestamp_ms: metadata.last_updated_ms,
        metadata_file: new_location.clone(),
    }];

    context.storage.write_json(&new_location, &metadata).await?;

    let catalog_properties = if metadata.properties.is_empty() {
        None
    } else {
        Some(metadata.properties.clone())
    };
    if let Err(e) = table_store::create_table(
        namespace,
        namespace_row.id,
        name,
        &new_location,
        catalog_properties.as_ref(),
        context.catalog.pool(),
    )
    .await
    {
        rollback_metadata_file(context, &new_location).await;
        return Err(e);
    }

    Ok(CommitTableResponse {
        metadata_location: new_location,
        metadata,
    })
}

pub async fn drop_table(
    context: &ApiContext,
    namespace: &[String],
    name: &str,
    purge: bool,
) -> Result<(), ErrorModel> {
    let row = table_store::get_table(namespace, name, context.catalog.pool())
        .await?
        .ok_or_else(|| ErrorModel::no_such_table(namespace, name))?;

    if purge {
        purge_metadata_files(context, &row.metadata_location).await;
    }

    table_store::drop_table(namespace, name, context.catalog.pool()).await
}

/// Deletes every distinct file named in the metadata log plus the current
/// pointer. Purge failures are logged, never fatal; manifests and data files
/// are left untouched.
async fn purge_metadata_files(context: &ApiContext, metadata_location: &str) {
    match context
        .storage
        .read_json::<TableMetadata>(metadata_location)
        .await
    {
        Ok(metadata) => {
            let files: Vec<String> = metadata
                .metadata_log
                .iter()
                .map(|entry| entry.metadata_file.clone())
                .chain(std::iter::once(metadata_location.to_string()))
                .unique()
                .collect();
            for file in files {
                if let Err(e) = context.storage.delete(&file).await {
                    tracing::warn!("Failed to purge metadata file {file}: {e}");
                }
            }
        }
        Err(e) => {
            tracing::warn!("Failed to read metadata at {metadata_location} for purge: {e}");
            if let Err(e) = context.storage.delete(metadata_location).await {
                tracing::warn!("Failed to purge metadata file {metadata_location}: {e}");
            }
        }
    }
}

pub async fn rename_table(
    context: &ApiContext,
    request: RenameTableRequest,
) -> Result<(), ErrorModel> {
    table_store::rename_table(&request.source, &request.destination, context.catalog.pool()).await
}
