use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::impl_into_response;

/// Catalog configuration handed to clients on `GET /v1/config`. `overrides`
/// win over client-provided settings, `defaults` fill the gaps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub defaults: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, String>,
}

impl_into_response!(CatalogConfig);
