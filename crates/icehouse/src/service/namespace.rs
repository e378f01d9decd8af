use crate::{
    catalog::rest::{
        CreateNamespaceRequest, ErrorModel, GetNamespaceResponse, ListNamespacesResponse,
        UpdateNamespacePropertiesRequest, UpdateNamespacePropertiesResponse,
    },
    implementations::sqlite::namespace as store,
    service::ApiContext,
};

fn non_empty_properties(
    properties: std::collections::BTreeMap<String, String>,
) -> Option<std::collections::BTreeMap<String, String>> {
    if properties.is_empty() {
        None
    } else {
        Some(properties)
    }
}

pub async fn create_namespace(
    context: &ApiContext,
    request: CreateNamespaceRequest,
) -> Result<GetNamespaceResponse, ErrorModel> {
    if request.namespace.is_empty() || request.namespace.iter().any(String::is_empty) {
        return Err(ErrorModel::validation(
            "Namespace must be a non-empty sequence of non-empty labels.",
        ));
    }
    let row = store::create_namespace(
        &request.namespace,
        request.properties.as_ref(),
        context.catalog.pool(),
    )
    .await?;
    Ok(GetNamespaceResponse {
        namespace: row.levels,
        properties: non_empty_properties(row.properties),
    })
}

pub async fn get_namespace(
    context: &ApiContext,
    levels: &[String],
) -> Result<GetNamespaceResponse, ErrorModel> {
    let row = store::get_namespace(levels, context.catalog.pool())
        .await?
        .ok_or_else(|| ErrorModel::no_such_namespace(levels))?;
    Ok(GetNamespaceResponse {
        namespace: row.levels,
        properties: non_empty_properties(row.properties),
    })
}

pub async fn namespace_exists(context: &ApiContext, levels: &[String]) -> Result<(), ErrorModel> {
    if store::namespace_exists(levels, context.catalog.pool()).await? {
        Ok(())
    } else {
        Err(ErrorModel::no_such_namespace(levels))
    }
}

pub async fn list_namespaces(
    context: &ApiContext,
    parent: Option<&[String]>,
) -> Result<ListNamespacesResponse, ErrorModel> {
    let rows = store::list_namespaces(parent, context.catalog.pool()).await?;
    Ok(ListNamespacesResponse {
        namespaces: rows.into_iter().map(|row| row.levels).collect(),
    })
}

pub async fn update_namespace_properties(
    context: &ApiContext,
    levels: &[String],
    request: UpdateNamespacePropertiesRequest,
) -> Result<UpdateNamespacePropertiesResponse, ErrorModel> {
    let updates = request.updates.unwrap_or_default();
    let removals = request.removals.unwrap_or_default();

    let previous =
        store::update_namespace_properties(levels, &updates, &removals, context.catalog.pool())
            .await?;

    let updated = updates.keys().cloned().collect();
    let (removed, missing): (Vec<String>, Vec<String>) = removals
        .into_iter()
        .partition(|key| previous.contains_key(key));

    Ok(UpdateNamespacePropertiesResponse {
        updated,
        removed,
        missing: if missing.is_empty() {
            None
        } else {
            Some(missing)
        },
    })
}

pub async fn drop_namespace(context: &ApiContext, levels: &[String]) -> Result<(), ErrorModel> {
    store::drop_namespace(levels, context.catalog.pool()).await
}
