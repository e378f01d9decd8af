//! End-to-end scenarios driven through the HTTP router against a temp-dir
//! warehouse and a temp-file catalog database.

use axum::{Router, body::Body};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use crate::{
    api::new_v1_router,
    implementations::sqlite::CatalogState,
    service::{ApiContext, MetadataManager, StorageAccessor},
};

async fn setup() -> (tempfile::TempDir, String, Router) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
    let catalog = CatalogState::connect(&url).await.unwrap();
    catalog.migrate().await.unwrap();
    let warehouse = dir.path().join("warehouse");
    std::fs::create_dir_all(&warehouse).unwrap();
    let warehouse_str = warehouse.display().to_string();
    let context = ApiContext::new(
        catalog,
        StorageAccessor::new(warehouse),
        MetadataManager::new(),
    );
    let router = new_v1_router().with_state(context);
    (dir, warehouse_str, router)
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn error_type(body: &serde_json::Value) -> &str {
    body["error"]["type"].as_str().unwrap_or_default()
}

fn create_table_body(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "schema": {
            "type": "struct",
            "fields": [
                {"id": 1, "name": "x", "type": "int", "required": false}
            ]
        }
    })
}

fn add_snapshot_body(snapshot_id: i64) -> serde_json::Value {
    serde_json::json!({
        "requirements": [],
        "updates": [{
            "action": "add-snapshot",
            "snapshot": {
                "snapshot-id": snapshot_id,
                "timestamp-ms": 1_700_000_000_000_i64,
                "manifest-list": format!("snap-{snapshot_id}.avro"),
                "schema-id": 0
            }
        }]
    })
}

async fn create_namespace(router: &Router, levels: &[&str]) {
    let (status, _) = send(
        router,
        Method::POST,
        "/v1/namespaces",
        Some(serde_json::json!({"namespace": levels})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn metadata_file_name(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}

#[tokio::test]
async fn test_s1_create_load_drop() {
    let (_dir, warehouse, router) = setup().await;
    create_namespace(&router, &["db"]).await;

    let (status, created) = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables",
        Some(create_table_body("t")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!created["metadata"]["table-uuid"]
        .as_str()
        .unwrap()
        .is_empty());
    assert_eq!(
        created["metadata"]["location"].as_str().unwrap(),
        format!("{warehouse}/db/t")
    );
    let location = created["metadata-location"].as_str().unwrap();
    assert!(metadata_file_name(location).starts_with("00000-"));
    assert!(location.ends_with(".metadata.json"));

    let (status, loaded) = send(&router, Method::GET, "/v1/namespaces/db/tables/t", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["metadata-location"], created["metadata-location"]);
    assert_eq!(loaded["metadata"], created["metadata"]);

    let (status, _) = send(&router, Method::DELETE, "/v1/namespaces/db/tables/t", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, Method::GET, "/v1/namespaces/db/tables/t", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_type(&body), "NoSuchTableException");
}

#[tokio::test]
async fn test_s2_concurrent_commit_race() {
    let (_dir, _warehouse, router) = setup().await;
    create_namespace(&router, &["db"]).await;
    let (status, _) = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables",
        Some(create_table_body("t")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let first = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables/t",
        Some(add_snapshot_body(1)),
    );
    let second = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables/t",
        Some(add_snapshot_body(2)),
    );
    let ((status_a, body_a), (status_b, body_b)) = tokio::join!(first, second);

    let mut outcomes = [(status_a, body_a), (status_b, body_b)];
    outcomes.sort_by_key(|(status, _)| *status);

    // At least one commit must win; a loser surfaces as CommitFailed and its
    // candidate file must not survive on disk.
    assert_eq!(outcomes[0].0, StatusCode::OK);
    let winner_location = outcomes[0].1["metadata-location"].as_str().unwrap();
    assert!(winner_location.contains("/metadata/0000"));

    match outcomes[1].0 {
        StatusCode::OK => {
            // Sequential interleaving: the chain advanced twice.
            let (_, loaded) =
                send(&router, Method::GET, "/v1/namespaces/db/tables/t", None).await;
            assert!(metadata_file_name(loaded["metadata-location"].as_str().unwrap())
                .starts_with("00002-"));
        }
        StatusCode::CONFLICT => {
            assert_eq!(error_type(&outcomes[1].1), "CommitFailedException");
            let (_, loaded) =
                send(&router, Method::GET, "/v1/namespaces/db/tables/t", None).await;
            assert!(metadata_file_name(loaded["metadata-location"].as_str().unwrap())
                .starts_with("00001-"));
        }
        other => panic!("unexpected status for second commit: {other}"),
    }
}

#[tokio::test]
async fn test_s3_requirement_failure_keeps_metadata() {
    let (_dir, _warehouse, router) = setup().await;
    create_namespace(&router, &["db"]).await;
    let (_, created) = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables",
        Some(create_table_body("t")),
    )
    .await;

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables/t",
        Some(serde_json::json!({
            "requirements": [{"type": "assert-table-uuid", "uuid": "wrong-uuid"}],
            "updates": []
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_type(&body), "CommitFailedException");

    let (_, loaded) = send(&router, Method::GET, "/v1/namespaces/db/tables/t", None).await;
    assert_eq!(loaded["metadata-location"], created["metadata-location"]);
}

#[tokio::test]
async fn test_s4_snapshot_ref_load() {
    let (_dir, _warehouse, router) = setup().await;
    create_namespace(&router, &["db"]).await;
    send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables",
        Some(create_table_body("t")),
    )
    .await;
    let (status, _) = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables/t",
        Some(add_snapshot_body(42)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for reference in ["main", "42"] {
        let (status, loaded) = send(
            &router,
            Method::GET,
            &format!("/v1/namespaces/db/tables/t?snapshot-ref={reference}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(loaded["metadata"]["current-snapshot-id"], 42);
    }

    let (status, body) = send(
        &router,
        Method::GET,
        "/v1/namespaces/db/tables/t?snapshot-ref=nope",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_type(&body), "NoSuchTableException");
}

#[tokio::test]
async fn test_s5_rename_collision() {
    let (_dir, _warehouse, router) = setup().await;
    create_namespace(&router, &["a"]).await;
    create_namespace(&router, &["b"]).await;
    for namespace in ["a", "b"] {
        let (status, _) = send(
            &router,
            Method::POST,
            &format!("/v1/namespaces/{namespace}/tables"),
            Some(create_table_body("t")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/tables/rename",
        Some(serde_json::json!({
            "source": {"namespace": ["a"], "name": "t"},
            "destination": {"namespace": ["b"], "name": "t"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_type(&body), "TableAlreadyExistsException");

    // A collision-free rename goes through and leaves exactly one of
    // source/destination existing.
    let (status, _) = send(
        &router,
        Method::POST,
        "/v1/tables/rename",
        Some(serde_json::json!({
            "source": {"namespace": ["a"], "name": "t"},
            "destination": {"namespace": ["b"], "name": "t2"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, Method::HEAD, "/v1/namespaces/a/tables/t", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&router, Method::HEAD, "/v1/namespaces/b/tables/t2", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_s6_non_empty_namespace_drop() {
    let (_dir, _warehouse, router) = setup().await;
    create_namespace(&router, &["db"]).await;
    send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables",
        Some(create_table_body("t")),
    )
    .await;

    let (status, body) = send(&router, Method::DELETE, "/v1/namespaces/db", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_type(&body), "ValidationException");

    let (status, _) = send(&router, Method::DELETE, "/v1/namespaces/db/tables/t", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, Method::DELETE, "/v1/namespaces/db", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, Method::HEAD, "/v1/namespaces/db", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_config_endpoint() {
    let (_dir, warehouse, router) = setup().await;
    let (status, body) = send(&router, Method::GET, "/v1/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["defaults"]["warehouse"].as_str().unwrap(), warehouse);
    assert!(body["overrides"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_namespace_listing_and_properties() {
    let (_dir, _warehouse, router) = setup().await;
    create_namespace(&router, &["db"]).await;
    create_namespace(&router, &["db", "schema"]).await;
    create_namespace(&router, &["other"]).await;

    let (status, body) = send(&router, Method::GET, "/v1/namespaces", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["namespaces"].as_array().unwrap().len(), 3);

    let (status, body) = send(&router, Method::GET, "/v1/namespaces?parent=db", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["namespaces"],
        serde_json::json!([["db", "schema"]])
    );

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/properties",
        Some(serde_json::json!({
            "updates": {"owner": "etl"},
            "removals": ["missing-key"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], serde_json::json!(["owner"]));
    assert_eq!(body["removed"], serde_json::json!([]));
    assert_eq!(body["missing"], serde_json::json!(["missing-key"]));

    let (status, body) = send(&router, Method::GET, "/v1/namespaces/db", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["properties"]["owner"], "etl");
}

#[tokio::test]
async fn test_register_table_round_trip() {
    let (_dir, _warehouse, router) = setup().await;
    create_namespace(&router, &["db"]).await;
    let (_, created) = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables",
        Some(create_table_body("t")),
    )
    .await;
    let location = created["metadata-location"].as_str().unwrap().to_string();

    let (status, _) = send(&router, Method::DELETE, "/v1/namespaces/db/tables/t", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, registered) = send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables/register",
        Some(serde_json::json!({"metadata-location": location})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(registered["metadata-location"].as_str().unwrap(), location);
    assert_eq!(registered["metadata"], created["metadata"]);

    let (status, _) = send(&router, Method::HEAD, "/v1/namespaces/db/tables/t", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let (_dir, _warehouse, router) = setup().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/namespaces")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error_type(&body), "ValidationException");
    assert_eq!(body["error"]["code"], 400);
}

#[tokio::test]
async fn test_commit_chain_versions_monotonically() {
    let (_dir, _warehouse, router) = setup().await;
    create_namespace(&router, &["db"]).await;
    send(
        &router,
        Method::POST,
        "/v1/namespaces/db/tables",
        Some(create_table_body("t")),
    )
    .await;

    for (snapshot_id, expected_prefix) in [(1, "00001-"), (2, "00002-"), (3, "00003-")] {
        let (status, committed) = send(
            &router,
            Method::POST,
            "/v1/namespaces/db/tables/t",
            Some(add_snapshot_body(snapshot_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let location = committed["metadata-location"].as_str().unwrap();
        assert!(metadata_file_name(location).starts_with(expected_prefix));
        assert_eq!(committed["metadata"]["current-snapshot-id"], snapshot_id);
    }
}
