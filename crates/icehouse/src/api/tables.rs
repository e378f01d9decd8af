use axum::extract::{Path, Query, State};
use http::StatusCode;
use serde::Deserialize;

use super::{Json, Result, parse_namespace_path};
use crate::{
    catalog::rest::{
        CommitTableRequest, CommitTableResponse, CreateTableRequest, ListTablesResponse,
        LoadTableResult, RegisterTableRequest, RenameTableRequest,
    },
    service::{ApiContext, tables},
};

#[derive(Debug, Deserialize)]
pub(crate) struct LoadTableQuery {
    #[serde(rename = "snapshot-ref")]
    pub snapshot_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DropTableQuery {
    #[serde(default)]
    pub purge: bool,
}

pub(crate) async fn list_tables(
    State(context): State<ApiContext>,
    Path(namespace_path): Path<String>,
) -> Result<ListTablesResponse> {
    let levels = parse_namespace_path(&namespace_path)?;
    Ok(tables::list_tables(&context, &levels).await?)
}

pub(crate) async fn create_table(
    State(context): State<ApiContext>,
    Path(namespace_path): Path<String>,
    Json(request): Json<CreateTableRequest>,
) -> Result<LoadTableResult> {
    let levels = parse_namespace_path(&namespace_path)?;
    Ok(tables::create_table(&context, &levels, request).await?)
}

pub(crate) async fn register_table(
    State(context): State<ApiContext>,
    Path(namespace_path): Path<String>,
    Json(request): Json<RegisterTableRequest>,
) -> Result<LoadTableResult> {
    let levels = parse_namespace_path(&namespace_path)?;
    Ok(tables::register_table(&context, &levels, request).await?)
}

pub(crate) async fn load_table(
    State(context): State<ApiContext>,
    Path((namespace_path, table_name)): Path<(String, String)>,
    Query(query): Query<LoadTableQuery>,
) -> Result<LoadTableResult> {
    let levels = parse_namespace_path(&namespace_path)?;
    Ok(tables::load_table(&context, &levels, &table_name, query.snapshot_ref.as_deref()).await?)
}

pub(crate) async fn table_exists(
    State(context): State<ApiContext>,
    Path((namespace_path, table_name)): Path<(String, String)>,
) -> Result<StatusCode> {
    let levels = parse_namespace_path(&namespace_path)?;
    tables::table_exists(&context, &levels, &table_name).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn commit_table(
    State(context): State<ApiContext>,
    Path((namespace_path, table_name)): Path<(String, String)>,
    Json(request): Json<CommitTableRequest>,
) -> Result<CommitTableResponse> {
    let levels = parse_namespace_path(&namespace_path)?;
    Ok(tables::commit_table(&context, &levels, &table_name, request).await?)
}

pub(crate) async fn drop_table(
    State(context): State<ApiContext>,
    Path((namespace_path, table_name)): Path<(String, String)>,
    Query(query): Query<DropTableQuery>,
) -> Result<StatusCode> {
    let levels = parse_namespace_path(&namespace_path)?;
    tables::drop_table(&context, &levels, &table_name, query.purge).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn rename_table(
    State(context): State<ApiContext>,
    Json(request): Json<RenameTableRequest>,
) -> Result<StatusCode> {
    tables::rename_table(&context, request).await?;
    Ok(StatusCode::NO_CONTENT)
}
