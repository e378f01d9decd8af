use std::collections::BTreeMap;

use sqlx::{Sqlite, types::Json};

use super::{dbutils::DBErrorHandler, namespace::get_namespace};
use crate::catalog::rest::{ErrorModel, TableIdent};

/// A persisted table row: the catalog's authoritative pointer to the table's
/// current metadata file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRow {
    pub id: i64,
    pub namespace_id: i64,
    pub name: String,
    pub metadata_location: String,
    pub properties: Option<BTreeMap<String, String>>,
}

#[derive(Debug, sqlx::FromRow)]
struct TableRecord {
    id: i64,
    namespace_id: i64,
    name: String,
    metadata_location: String,
    properties: Option<Json<BTreeMap<String, String>>>,
}

impl From<TableRecord> for TableRow {
    fn from(record: TableRecord) -> Self {
        TableRow {
            id: record.id,
            namespace_id: record.namespace_id,
            name: record.name,
            metadata_location: record.metadata_location,
            properties: record.properties.map(|p| p.0),
        }
    }
}

const TABLE_COLUMNS: &str = "t.id, t.namespace_id, t.name, t.metadata_location, t.properties";

pub(crate) async fn get_table<'c, E: sqlx::Executor<'c, Database = Sqlite>>(
    namespace: &[String],
    name: &str,
    executor: E,
) -> Result<Option<TableRow>, ErrorModel> {
    let record = sqlx::query_as::<_, TableRecord>(&format!(
        "SELECT {TABLE_COLUMNS} FROM tables t \
         JOIN namespaces n ON t.namespace_id = n.id \
         WHERE n.levels = ? AND t.name = ?"
    ))
    .bind(serde_json::to_string(namespace).unwrap_or_default())
    .bind(name)
    .fetch_optional(executor)
    .await
    .map_err(|e| e.into_error_model("Failed to load table"))?;
    Ok(record.map(TableRow::from))
}

pub(crate) async fn list_tables(
    namespace_id: i64,
    pool: &sqlx::SqlitePool,
) -> Result<Vec<TableRow>, ErrorModel> {
    let records = sqlx::query_as::<_, TableRecord>(&format!(
        "SELECT {TABLE_COLUMNS} FROM tables t WHERE t.namespace_id = ? ORDER BY t.name"
    ))
    .bind(namespace_id)
    .fetch_all(pool)
    .await
    .map_err(|e| e.into_error_model("Failed to list tables"))?;
    Ok(records.into_iter().map(TableRow::from).collect())
}

pub(crate) async fn create_table(
    namespace: &[String],
    namespace_id: i64,
    name: &str,
    metadata_location: &str,
    properties: Option<&BTreeMap<String, String>>,
    pool: &sqlx::SqlitePool,
) -> Result<TableRow, ErrorModel> {
    let record = sqlx::query_as::<_, TableRecord>(
        "INSERT INTO tables (namespace_id, name, metadata_location, properties) \
         VALUES (?, ?, ?, ?) \
         RETURNING id, namespace_id, name, metadata_location, properties",
    )
    .bind(namespace_id)
    .bind(name)
    .bind(metadata_location)
    .bind(properties.map(Json))
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            if db.message().contains("metadata_location") {
                ErrorModel::conflict(
                    format!(
                        "Metadata location is already referenced by another table: {metadata_location}"
                    ),
                    "TableAlreadyExistsException",
                    None,
                )
            } else {
                tracing::debug!("Table already exists: {db:?}");
                ErrorModel::table_already_exists(namespace, name)
            }
        }
        _ => e.into_error_model("Failed to create table"),
    })?;
    Ok(record.into())
}

/// Atomic rename across namespaces. The metadata pointer is left untouched.
pub(crate) async fn rename_table(
    source: &TableIdent,
    destination: &TableIdent,
    pool: &sqlx::SqlitePool,
) -> Result<(), ErrorModel> {
    let mut transaction = pool
        .begin()
        .await
        .map_err(|e| e.into_error_model("Failed to open catalog transaction"))?;

    let source_row = get_table(&source.namespace, &source.name, &mut *transaction)
        .await?
        .ok_or_else(|| ErrorModel::no_such_table(&source.namespace, &source.name))?;

    let destination_namespace = get_namespace(&destination.namespace, &mut *transaction)
        .await?
        .ok_or_else(|| ErrorModel::no_such_namespace(&destination.namespace))?;

    if get_table(&destination.namespace, &destination.name, &mut *transaction)
        .await?
        .is_some()
    {
        return Err(ErrorModel::table_already_exists(
            &destination.namespace,
            &destination.name,
        ));
    }

    sqlx::query("UPDATE tables SET namespace_id = ?, name = ? WHERE id = ?")
        .bind(destination_namespace.id)
        .bind(&destination.name)
        .bind(source_row.id)
        .execute(&mut *transaction)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ErrorModel::table_already_exists(&destination.namespace, &destination.name)
            }
            _ => e.into_error_model("Failed to rename table"),
        })?;

    transaction
        .commit()
        .await
        .map_err(|e| e.into_error_model("Failed to commit catalog transaction"))
}

/// The optimistic-lock primitive: advances the metadata pointer iff the row
/// still carries `expected_location`.
pub(crate) async fn cas_update_metadata_location(
    namespace: &[String],
    name: &str,
    expected_location: &str,
    new_location: &str,
    pool: &sqlx::SqlitePool,
) -> Result<TableRow, ErrorModel> {
    let mut transaction = pool
        .begin()
        .await
        .map_err(|e| e.into_error_model("Failed to open catalog transaction"))?;

    let updated = sqlx::query_as::<_, TableRecord>(
        "UPDATE tables SET metadata_location = ? \
         WHERE name = ? \
           AND metadata_location = ? \
           AND namespace_id = (SELECT id FROM namespaces WHERE levels = ?) \
         RETURNING id, namespace_id, name, metadata_location, properties",
    )
    .bind(new_location)
    .bind(name)
    .bind(expected_location)
    .bind(serde_json::to_string(namespace).unwrap_or_default())
    .fetch_optional(&mut *transaction)
    .await
    .map_err(|e| e.into_error_model("Failed to update metadata location"))?;

    if let Some(record) = updated {
        transaction
            .commit()
            .await
            .map_err(|e| e.into_error_model("Failed to commit catalog transaction"))?;
        return Ok(record.into());
    }

    // Zero rows affected: distinguish a lost race from a vanished table.
    let current = get_table(namespace, name, &mut *transaction).await?;
    match current {
        None => Err(ErrorModel::no_such_table(namespace, name)),
        Some(row) => Err(ErrorModel::commit_failed_with_reason(
            "Optimistic lock failed: metadata location has changed.",
            format!(
                "Expected {expected_location}, found {}",
                row.metadata_location
            ),
        )),
    }
}

pub(crate) async fn drop_table(
    namespace: &[String],
    name: &str,
    pool: &sqlx::SqlitePool,
) -> Result<(), ErrorModel> {
    let result = sqlx::query(
        "DELETE FROM tables \
         WHERE name = ? \
           AND namespace_id = (SELECT id FROM namespaces WHERE levels = ?)",
    )
    .bind(name)
    .bind(serde_json::to_string(namespace).unwrap_or_default())
    .execute(pool)
    .await
    .map_err(|e| e.into_error_model("Failed to drop table"))?;

    if result.rows_affected() == 0 {
        return Err(ErrorModel::no_such_table(namespace, name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        super::{namespace::create_namespace, test_support::temp_catalog},
        *,
    };

    fn levels(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    async fn catalog_with_namespace(
        parts: &[&str],
    ) -> (tempfile::TempDir, super::super::CatalogState, i64) {
        let (dir, catalog) = temp_catalog().await;
        let ns = create_namespace(&levels(parts), None, catalog.pool())
            .await
            .unwrap();
        (dir, catalog, ns.id)
    }

    #[tokio::test]
    async fn test_create_get_drop_table() {
        let (_dir, catalog, ns_id) = catalog_with_namespace(&["db"]).await;
        let created = create_table(
            &levels(&["db"]),
            ns_id,
            "t",
            "/wh/db/t/metadata/00000-a.metadata.json",
            None,
            catalog.pool(),
        )
        .await
        .unwrap();
        assert_eq!(created.name, "t");

        let loaded = get_table(&levels(&["db"]), "t", catalog.pool())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, created);

        drop_table(&levels(&["db"]), "t", catalog.pool())
            .await
            .unwrap();
        assert!(get_table(&levels(&["db"]), "t", catalog.pool())
            .await
            .unwrap()
            .is_none());

        let err = drop_table(&levels(&["db"]), "t", catalog.pool())
            .await
            .unwrap_err();
        assert_eq!(err.r#type, "NoSuchTableException");
    }

    #[tokio::test]
    async fn test_duplicate_table_name_conflicts() {
        let (_dir, catalog, ns_id) = catalog_with_namespace(&["db"]).await;
        create_table(&levels(&["db"]), ns_id, "t", "/wh/a", None, catalog.pool())
            .await
            .unwrap();
        let err = create_table(&levels(&["db"]), ns_id, "t", "/wh/b", None, catalog.pool())
            .await
            .unwrap_err();
        assert_eq!(err.code, 409);
        assert_eq!(err.r#type, "TableAlreadyExistsException");
    }

    #[tokio::test]
    async fn test_duplicate_metadata_location_conflicts() {
        let (_dir, catalog, ns_id) = catalog_with_namespace(&["db"]).await;
        create_table(&levels(&["db"]), ns_id, "t1", "/wh/same", None, catalog.pool())
            .await
            .unwrap();
        let err = create_table(&levels(&["db"]), ns_id, "t2", "/wh/same", None, catalog.pool())
            .await
            .unwrap_err();
        assert_eq!(err.code, 409);
        assert!(err.message.contains("/wh/same"));
    }

    #[tokio::test]
    async fn test_cas_success_chains_locations() {
        let (_dir, catalog, ns_id) = catalog_with_namespace(&["db"]).await;
        create_table(&levels(&["db"]), ns_id, "t", "/wh/v0", None, catalog.pool())
            .await
            .unwrap();

        let row =
            cas_update_metadata_location(&levels(&["db"]), "t", "/wh/v0", "/wh/v1", catalog.pool())
                .await
                .unwrap();
        assert_eq!(row.metadata_location, "/wh/v1");

        // A second commit from the stale base loses.
        let err =
            cas_update_metadata_location(&levels(&["db"]), "t", "/wh/v0", "/wh/v2", catalog.pool())
                .await
                .unwrap_err();
        assert_eq!(err.code, 409);
        assert_eq!(err.r#type, "CommitFailedException");
        assert!(err.message.contains("/wh/v0"));
        assert!(err.message.contains("/wh/v1"));

        // The pointer still names the winner.
        let current = get_table(&levels(&["db"]), "t", catalog.pool())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.metadata_location, "/wh/v1");
    }

    #[tokio::test]
    async fn test_cas_on_missing_table_is_not_found() {
        let (_dir, catalog, _ns_id) = catalog_with_namespace(&["db"]).await;
        let err =
            cas_update_metadata_location(&levels(&["db"]), "ghost", "/a", "/b", catalog.pool())
                .await
                .unwrap_err();
        assert_eq!(err.r#type, "NoSuchTableException");
    }

    #[tokio::test]
    async fn test_rename_atomicity_and_collisions() {
        let (_dir, catalog) = temp_catalog().await;
        let ns_a = create_namespace(&levels(&["a"]), None, catalog.pool())
            .await
            .unwrap();
        let ns_b = create_namespace(&levels(&["b"]), None, catalog.pool())
            .await
            .unwrap();
        create_table(&levels(&["a"]), ns_a.id, "t", "/wh/a/t", None, catalog.pool())
            .await
            .unwrap();
        create_table(&levels(&["b"]), ns_b.id, "t", "/wh/b/t", None, catalog.pool())
            .await
            .unwrap();

        let source = TableIdent::new(levels(&["a"]), "t");

        // Destination already exists.
        let err = rename_table(
            &source,
            &TableIdent::new(levels(&["b"]), "t"),
            catalog.pool(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.r#type, "TableAlreadyExistsException");

        // Destination namespace does not exist.
        let err = rename_table(
            &source,
            &TableIdent::new(levels(&["ghost"]), "t"),
            catalog.pool(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.r#type, "NoSuchNamespaceException");

        // Successful rename keeps the metadata pointer.
        rename_table(
            &source,
            &TableIdent::new(levels(&["b"]), "t2"),
            catalog.pool(),
        )
        .await
        .unwrap();
        assert!(get_table(&levels(&["a"]), "t", catalog.pool())
            .await
            .unwrap()
            .is_none());
        let moved = get_table(&levels(&["b"]), "t2", catalog.pool())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.metadata_location, "/wh/a/t");

        // Renaming a missing source fails.
        let err = rename_table(
            &TableIdent::new(levels(&["a"]), "t"),
            &TableIdent::new(levels(&["b"]), "t3"),
            catalog.pool(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.r#type, "NoSuchTableException");
    }

    #[tokio::test]
    async fn test_list_tables_sorted_by_name() {
        let (_dir, catalog, ns_id) = catalog_with_namespace(&["db"]).await;
        for (name, location) in [("zeta", "/wh/z"), ("alpha", "/wh/a")] {
            create_table(&levels(&["db"]), ns_id, name, location, None, catalog.pool())
                .await
                .unwrap();
        }
        let names: Vec<_> = list_tables(ns_id, catalog.pool())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
