use std::collections::BTreeMap;

use sqlx::{Sqlite, types::Json};

use super::dbutils::DBErrorHandler;
use crate::catalog::rest::ErrorModel;

/// A persisted namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceRow {
    pub id: i64,
    pub levels: Vec<String>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, sqlx::FromRow)]
struct NamespaceRecord {
    id: i64,
    levels: String,
    properties: Json<BTreeMap<String, String>>,
}

impl NamespaceRecord {
    fn into_row(self) -> Result<NamespaceRow, ErrorModel> {
        let levels = serde_json::from_str(&self.levels).map_err(|e| {
            ErrorModel::internal(
                format!("Corrupt namespace levels in catalog row {}", self.id),
                "DatabaseError",
                Some(Box::new(e)),
            )
        })?;
        Ok(NamespaceRow {
            id: self.id,
            levels,
            properties: self.properties.0,
        })
    }
}

fn encode_levels(levels: &[String]) -> String {
    serde_json::to_string(levels).unwrap_or_default()
}

pub(crate) async fn get_namespace<'c, E: sqlx::Executor<'c, Database = Sqlite>>(
    levels: &[String],
    executor: E,
) -> Result<Option<NamespaceRow>, ErrorModel> {
    let record = sqlx::query_as::<_, NamespaceRecord>(
        "SELECT id, levels, properties FROM namespaces WHERE levels = ?",
    )
    .bind(encode_levels(levels))
    .fetch_optional(executor)
    .await
    .map_err(|e| e.into_error_model("Failed to load namespace"))?;
    record.map(NamespaceRecord::into_row).transpose()
}

pub(crate) async fn namespace_exists(
    levels: &[String],
    pool: &sqlx::SqlitePool,
) -> Result<bool, ErrorModel> {
    Ok(get_namespace(levels, pool).await?.is_some())
}

pub(crate) async fn create_namespace(
    levels: &[String],
    properties: Option<&BTreeMap<String, String>>,
    pool: &sqlx::SqlitePool,
) -> Result<NamespaceRow, ErrorModel> {
    let properties = properties.cloned().unwrap_or_default();
    let record = sqlx::query_as::<_, NamespaceRecord>(
        "INSERT INTO namespaces (levels, properties) VALUES (?, ?) \
         RETURNING id, levels, properties",
    )
    .bind(encode_levels(levels))
    .bind(Json(&properties))
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            tracing::debug!("Namespace already exists: {db:?}");
            ErrorModel::namespace_already_exists(levels)
        }
        _ => e.into_error_model("Failed to create namespace"),
    })?;
    record.into_row()
}

/// When `parent` is given, returns only direct children (levels one longer
/// than the parent, sharing its prefix); otherwise all namespaces.
pub(crate) async fn list_namespaces(
    parent: Option<&[String]>,
    pool: &sqlx::SqlitePool,
) -> Result<Vec<NamespaceRow>, ErrorModel> {
    let records = sqlx::query_as::<_, NamespaceRecord>(
        "SELECT id, levels, properties FROM namespaces ORDER BY levels",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| e.into_error_model("Failed to list namespaces"))?;

    let mut namespaces = Vec::with_capacity(records.len());
    for record in records {
        let row = record.into_row()?;
        let keep = match parent {
            Some(parent) => {
                row.levels.len() == parent.len() + 1 && row.levels.starts_with(parent)
            }
            None => true,
        };
        if keep {
            namespaces.push(row);
        }
    }
    Ok(namespaces)
}

/// Atomically merges `updates` into and strips `removals` from the namespace
/// properties. Returns the pre-update property set so the caller can compute
/// the updated/removed/missing key partitioning.
pub(crate) async fn update_namespace_properties(
    levels: &[String],
    updates: &BTreeMap<String, String>,
    removals: &[String],
    pool: &sqlx::SqlitePool,
) -> Result<BTreeMap<String, String>, ErrorModel> {
    let mut transaction = pool
        .begin()
        .await
        .map_err(|e| e.into_error_model("Failed to open catalog transaction"))?;

    let row = get_namespace(levels, &mut *transaction)
        .await?
        .ok_or_else(|| ErrorModel::no_such_namespace(levels))?;

    let previous = row.properties.clone();
    let mut properties = row.properties;
    for key in removals {
        properties.remove(key);
    }
    properties.extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));

    sqlx::query("UPDATE namespaces SET properties = ? WHERE id = ?")
        .bind(Json(&properties))
        .bind(row.id)
        .execute(&mut *transaction)
        .await
        .map_err(|e| e.into_error_model("Failed to update namespace properties"))?;

    transaction
        .commit()
        .await
        .map_err(|e| e.into_error_model("Failed to commit catalog transaction"))?;
    Ok(previous)
}

/// Refuses to drop a namespace that still owns tables.
pub(crate) async fn drop_namespace(
    levels: &[String],
    pool: &sqlx::SqlitePool,
) -> Result<(), ErrorModel> {
    let mut transaction = pool
        .begin()
        .await
        .map_err(|e| e.into_error_model("Failed to open catalog transaction"))?;

    let row = get_namespace(levels, &mut *transaction)
        .await?
        .ok_or_else(|| ErrorModel::no_such_namespace(levels))?;

    let table_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tables WHERE namespace_id = ?")
            .bind(row.id)
            .fetch_one(&mut *transaction)
            .await
            .map_err(|e| e.into_error_model("Failed to count namespace tables"))?;
    if table_count > 0 {
        return Err(ErrorModel::validation(format!(
            "Namespace {} is not empty. Contains tables.",
            levels.join(".")
        )));
    }

    sqlx::query("DELETE FROM namespaces WHERE id = ?")
        .bind(row.id)
        .execute(&mut *transaction)
        .await
        .map_err(|e| e.into_error_model("Failed to drop namespace"))?;

    transaction
        .commit()
        .await
        .map_err(|e| e.into_error_model("Failed to commit catalog transaction"))
}
