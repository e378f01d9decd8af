use std::path::{Component, Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

use crate::catalog::rest::ErrorModel;

/// Scoped JSON file access under a warehouse root.
///
/// Relative paths resolve against the root and must stay inside it; absolute
/// paths and URIs are trusted as-is (the catalog owns the warehouse
/// directory, table locations inside it are absolute).
#[derive(Debug)]
pub struct StorageAccessor {
    warehouse_root: PathBuf,
}

#[derive(Debug, thiserror::Error)]
#[error("{operation} failed for `{}`", path.display())]
struct StorageIoError {
    operation: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

impl StorageIoError {
    fn new(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        StorageIoError {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    fn into_error_model(self) -> ErrorModel {
        ErrorModel::internal(
            self.to_string(),
            "InternalServerErrorException",
            Some(Box::new(self)),
        )
    }
}

fn lexically_normalized(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

impl StorageAccessor {
    #[must_use]
    pub fn new(warehouse_root: impl Into<PathBuf>) -> Self {
        let warehouse_root: PathBuf = warehouse_root.into();
        let warehouse_root = if warehouse_root.is_absolute() {
            warehouse_root
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("/"))
                .join(warehouse_root)
        };
        StorageAccessor {
            warehouse_root: lexically_normalized(&warehouse_root),
        }
    }

    #[must_use]
    pub fn warehouse_root(&self) -> &Path {
        &self.warehouse_root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ErrorModel> {
        if path.contains("://") {
            return Ok(PathBuf::from(
                path.strip_prefix("file://").unwrap_or(path),
            ));
        }
        if Path::new(path).is_absolute() {
            return Ok(PathBuf::from(path));
        }
        let resolved = lexically_normalized(&self.warehouse_root.join(path));
        if !resolved.starts_with(&self.warehouse_root) {
            return Err(ErrorModel::validation(format!(
                "Path traversal attempt detected for relative path: {path}"
            )));
        }
        Ok(resolved)
    }

    pub async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ErrorModel> {
        let resolved = self.resolve(path)?;
        let content = tokio::fs::read(&resolved).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ErrorModel::not_found("File", resolved.display())
            } else {
                StorageIoError::new("read", &resolved, e).into_error_model()
            }
        })?;
        serde_json::from_slice(&content).map_err(|e| {
            ErrorModel::validation(format!(
                "Could not parse JSON from {}: {e}",
                resolved.display()
            ))
        })
    }

    /// Writes pretty-printed JSON, via a temporary sibling file and a rename
    /// so readers never observe a torn document.
    pub async fn write_json<T: Serialize + Sync>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<(), ErrorModel> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageIoError::new("create parent dirs", parent, e).into_error_model())?;
        }
        let content = serde_json::to_vec_pretty(value).map_err(|e| {
            ErrorModel::internal(
                format!("Failed to serialize JSON for {}", resolved.display()),
                "InternalServerErrorException",
                Some(Box::new(e)),
            )
        })?;
        let temp = resolved.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp, &content)
            .await
            .map_err(|e| StorageIoError::new("write", &temp, e).into_error_model())?;
        tokio::fs::rename(&temp, &resolved)
            .await
            .map_err(|e| StorageIoError::new("rename", &resolved, e).into_error_model())
    }

    pub async fn exists(&self, path: &str) -> Result<bool, ErrorModel> {
        let resolved = self.resolve(path)?;
        tokio::fs::try_exists(&resolved)
            .await
            .map_err(|e| StorageIoError::new("stat", &resolved, e).into_error_model())
    }

    /// Idempotent: deleting a missing file is not an error.
    pub async fn delete(&self, path: &str) -> Result<(), ErrorModel> {
        let resolved = self.resolve(path)?;
        match tokio::fs::remove_file(&resolved).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageIoError::new("delete", &resolved, e).into_error_model()),
        }
    }
}
