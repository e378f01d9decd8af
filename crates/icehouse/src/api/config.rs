use axum::extract::State;

use super::Result;
use crate::{catalog::rest::CatalogConfig, service::ApiContext};

/// Catalog defaults and overrides handed to connecting clients.
pub(crate) async fn get_config(State(context): State<ApiContext>) -> Result<CatalogConfig> {
    let defaults = [
        (
            "warehouse".to_string(),
            context.storage.warehouse_root().display().to_string(),
        ),
        (
            "catalog-impl".to_string(),
            "org.apache.iceberg.rest.RESTCatalog".to_string(),
        ),
        (
            "table-default.write.format.default".to_string(),
            "parquet".to_string(),
        ),
    ]
    .into_iter()
    .collect();

    Ok(CatalogConfig {
        defaults,
        overrides: std::collections::BTreeMap::new(),
    })
}
