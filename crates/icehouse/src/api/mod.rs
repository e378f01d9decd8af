pub mod config;
pub mod namespaces;
pub mod tables;

use std::time::Duration;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRequest, Request},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tower_http::{
    catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{
    CONFIG,
    catalog::rest::{ErrorModel, IcebergErrorResponse},
    service::ApiContext,
};

pub type Result<T, E = IcebergErrorResponse> = std::result::Result<T, E>;

/// Request-body extractor that coerces JSON parse failures into the catalog's
/// `ValidationException` wire shape instead of axum's plain-text rejection.
#[derive(Debug)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = IcebergErrorResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(ErrorModel::validation(format!(
                "body: {}",
                rejection.body_text()
            ))
            .into()),
        }
    }
}

/// Splits a dot-separated namespace path into its labels.
pub(crate) fn parse_namespace_path(raw: &str) -> Result<Vec<String>, IcebergErrorResponse> {
    let levels: Vec<String> = raw.split('.').map(ToString::to_string).collect();
    if levels.is_empty() || levels.iter().any(String::is_empty) {
        return Err(ErrorModel::validation(format!(
            "Invalid namespace path '{raw}': expected dot-separated non-empty labels."
        ))
        .into());
    }
    Ok(levels)
}

#[must_use]
pub fn new_v1_router() -> Router<ApiContext> {
    Router::new()
        .route("/v1/config", get(config::get_config))
        .route(
            "/v1/namespaces",
            get(namespaces::list_namespaces).post(namespaces::create_namespace),
        )
        .route(
            "/v1/namespaces/{namespace}",
            get(namespaces::get_namespace)
                .head(namespaces::namespace_exists)
                .delete(namespaces::drop_namespace),
        )
        .route(
            "/v1/namespaces/{namespace}/properties",
            post(namespaces::update_namespace_properties),
        )
        .route(
            "/v1/namespaces/{namespace}/tables",
            get(tables::list_tables).post(tables::create_table),
        )
        .route(
            "/v1/namespaces/{namespace}/tables/register",
            post(tables::register_table),
        )
        .route(
            "/v1/namespaces/{namespace}/tables/{table}",
            get(tables::load_table)
                .head(tables::table_exists)
                .post(tables::commit_table)
                .delete(tables::drop_table),
        )
        .route("/v1/tables/rename", post(tables::rename_table))
}

/// The v1 routes with the standard middleware stack applied.
#[must_use]
pub fn new_full_router(context: ApiContext) -> Router {
    new_v1_router()
        .layer(DefaultBodyLimit::max(CONFIG.max_request_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            CONFIG.max_request_time_seconds,
        )))
        .layer(CatchPanicLayer::new())
        .with_state(context)
}

/// Serve the given router on the given listener until the cancellation token
/// fires; in-flight requests drain before shutdown completes.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let cancellation_future = async move {
        cancellation_token.cancelled().await;
        tracing::info!("HTTP server shutdown requested (cancellation token)");
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(cancellation_future)
        .await
        .map_err(|e| anyhow::anyhow!(e).context("error running HTTP server"))
}
