use axum::extract::{Path, Query, State};
use http::StatusCode;
use serde::Deserialize;

use super::{Json, Result, parse_namespace_path};
use crate::{
    catalog::rest::{
        CreateNamespaceRequest, GetNamespaceResponse, ListNamespacesResponse,
        UpdateNamespacePropertiesRequest, UpdateNamespacePropertiesResponse,
    },
    service::{ApiContext, namespace},
};

#[derive(Debug, Deserialize)]
pub(crate) struct ListNamespacesQuery {
    pub parent: Option<String>,
}

pub(crate) async fn list_namespaces(
    State(context): State<ApiContext>,
    Query(query): Query<ListNamespacesQuery>,
) -> Result<ListNamespacesResponse> {
    let parent = match query.parent.as_deref() {
        // An empty parent means the root: list top-level namespaces.
        None => None,
        Some("") => Some(Vec::new()),
        Some(raw) => Some(parse_namespace_path(raw)?),
    };
    Ok(namespace::list_namespaces(&context, parent.as_deref()).await?)
}

pub(crate) async fn create_namespace(
    State(context): State<ApiContext>,
    Json(request): Json<CreateNamespaceRequest>,
) -> Result<GetNamespaceResponse> {
    Ok(namespace::create_namespace(&context, request).await?)
}

pub(crate) async fn get_namespace(
    State(context): State<ApiContext>,
    Path(namespace_path): Path<String>,
) -> Result<GetNamespaceResponse> {
    let levels = parse_namespace_path(&namespace_path)?;
    Ok(namespace::get_namespace(&context, &levels).await?)
}

pub(crate) async fn namespace_exists(
    State(context): State<ApiContext>,
    Path(namespace_path): Path<String>,
) -> Result<StatusCode> {
    let levels = parse_namespace_path(&namespace_path)?;
    namespace::namespace_exists(&context, &levels).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn update_namespace_properties(
    State(context): State<ApiContext>,
    Path(namespace_path): Path<String>,
    Json(request): Json<UpdateNamespacePropertiesRequest>,
) -> Result<UpdateNamespacePropertiesResponse> {
    let levels = parse_namespace_path(&namespace_path)?;
    Ok(namespace::update_namespace_properties(&context, &levels, request).await?)
}

pub(crate) async fn drop_namespace(
    State(context): State<ApiContext>,
    Path(namespace_path): Path<String>,
) -> Result<StatusCode> {
    let levels = parse_namespace_path(&namespace_path)?;
    namespace::drop_namespace(&context, &levels).await?;
    Ok(StatusCode::NO_CONTENT)
}
