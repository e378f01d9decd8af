pub mod metadata_manager;
pub mod namespace;
pub mod storage;
pub mod tables;

use std::sync::Arc;

pub use metadata_manager::MetadataManager;
pub use storage::StorageAccessor;

use crate::implementations::sqlite::CatalogState;

/// Collaborators shared by all request handlers, scoped to the service
/// lifetime. Tests substitute temp-dir and temp-database variants.
#[derive(Clone, Debug)]
pub struct ApiContext {
    pub catalog: CatalogState,
    pub storage: Arc<StorageAccessor>,
    pub metadata: MetadataManager,
}

impl ApiContext {
    #[must_use]
    pub fn new(catalog: CatalogState, storage: StorageAccessor, metadata: MetadataManager) -> Self {
        ApiContext {
            catalog,
            storage: Arc::new(storage),
            metadata,
        }
    }
}
