mod config;
mod error;
mod namespace;
mod table;

pub use config::CatalogConfig;
pub use error::{ErrorModel, IcebergErrorResponse};
pub use namespace::{
    CreateNamespaceRequest, GetNamespaceResponse, ListNamespacesResponse,
    UpdateNamespacePropertiesRequest, UpdateNamespacePropertiesResponse,
};
pub use table::{
    CommitTableRequest, CommitTableResponse, CreateTableRequest, ListTablesResponse,
    LoadTableResult, RegisterTableRequest, RenameTableRequest, TableIdent, TableRequirement,
    TableUpdate,
};

macro_rules! impl_into_response {
    ($type:ty) => {
        impl axum::response::IntoResponse for $type {
            fn into_response(self) -> axum::http::Response<axum::body::Body> {
                axum::Json(self).into_response()
            }
        }
    };
}

pub(crate) use impl_into_response;
