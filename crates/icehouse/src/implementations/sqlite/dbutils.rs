use crate::catalog::rest::ErrorModel;

pub(crate) trait DBErrorHandler
where
    Self: ToString + Sized + Send + Sync + std::error::Error + 'static,
{
    fn into_error_model(self, message: impl Into<String>) -> ErrorModel;
}

impl DBErrorHandler for sqlx::Error {
    fn into_error_model(self, message: impl Into<String>) -> ErrorModel {
        match self {
            Self::Database(ref db) if db.is_unique_violation() => {
                ErrorModel::conflict(message, "EntityAlreadyExists", Some(Box::new(self)))
            }
            Self::PoolTimedOut => ErrorModel::service_unavailable(message, Some(Box::new(self))),
            _ => ErrorModel::internal(message, "DatabaseError", Some(Box::new(self))),
        }
    }
}
