use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// JSON wrapper for all error responses (non-2xx)
#[derive(Debug, Serialize, Deserialize)]
pub struct IcebergErrorResponse {
    pub error: ErrorModel,
}

/// JSON error payload returned in a response with further details on the error
#[derive(Default, Debug, TypedBuilder, Serialize, Deserialize)]
pub struct ErrorModel {
    /// Human-readable error message
    #[builder(setter(into))]
    pub message: String,
    /// Internal type definition of the error
    #[builder(setter(into))]
    pub r#type: String,
    /// HTTP response code
    pub code: u16,
    #[serde(skip)]
    #[builder(default)]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub stack: Vec<String>,
}

impl From<ErrorModel> for IcebergErrorResponse {
    fn from(value: ErrorModel) -> Self {
        IcebergErrorResponse { error: value }
    }
}

impl From<IcebergErrorResponse> for ErrorModel {
    fn from(value: IcebergErrorResponse) -> Self {
        value.error
    }
}

impl Display for IcebergErrorResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

fn error_chain_fmt(e: impl std::error::Error, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "{e}\n")?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{cause}")?;
        current = cause.source();
    }
    Ok(())
}

impl StdError for ErrorModel {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl Display for ErrorModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({}): {}", self.r#type, self.code, self.message)?;

        if !self.stack.is_empty() {
            writeln!(f, "Stack:")?;
            for detail in &self.stack {
                writeln!(f, "  {detail}")?;
            }
        }

        if let Some(source) = self.source.as_ref() {
            writeln!(f, "Caused by:")?;
            error_chain_fmt(&**source, f)?;
        }

        Ok(())
    }
}

impl ErrorModel {
    pub fn new(
        message: impl Into<String>,
        r#type: impl Into<String>,
        code: u16,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::builder()
            .message(message)
            .r#type(r#type)
            .code(code)
            .source(source)
            .build()
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            message,
            "BadRequestException",
            StatusCode::BAD_REQUEST.as_u16(),
            None,
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            message,
            "ValidationException",
            StatusCode::BAD_REQUEST.as_u16(),
            None,
        )
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            message,
            "AuthenticationFailedException",
            StatusCode::UNAUTHORIZED.as_u16(),
            None,
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            message,
            "PermissionDeniedException",
            StatusCode::FORBIDDEN.as_u16(),
            None,
        )
    }

    pub fn not_found(resource_type: &str, identifier: impl Display) -> Self {
        Self::new(
            format!("{resource_type} with identifier '{identifier}' not found."),
            "NotFoundException",
            StatusCode::NOT_FOUND.as_u16(),
            None,
        )
    }

    pub fn no_such_namespace(namespace: &[String]) -> Self {
        Self::new(
            format!(
                "Namespace with identifier '{}' not found.",
                namespace.join(".")
            ),
            "NoSuchNamespaceException",
            StatusCode::NOT_FOUND.as_u16(),
            None,
        )
    }

    pub fn no_such_table(namespace: &[String], name: &str) -> Self {
        Self::new(
            format!(
                "Table with identifier '{}.{name}' not found.",
                namespace.join(".")
            ),
            "NoSuchTableException",
            StatusCode::NOT_FOUND.as_u16(),
            None,
        )
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(
            message,
            "MethodNotAllowedException",
            StatusCode::METHOD_NOT_ALLOWED.as_u16(),
            None,
        )
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(
            message,
            "NotAcceptableException",
            StatusCode::NOT_ACCEPTABLE.as_u16(),
            None,
        )
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(
            message,
            "UnsupportedMediaTypeException",
            StatusCode::UNSUPPORTED_MEDIA_TYPE.as_u16(),
            None,
        )
    }

    pub fn namespace_already_exists(namespace: &[String]) -> Self {
        Self::new(
            format!("Namespace already exists: {}", namespace.join(".")),
            "NamespaceAlreadyExistsException",
            StatusCode::CONFLICT.as_u16(),
            None,
        )
    }

    pub fn table_already_exists(namespace: &[String], name: &str) -> Self {
        Self::new(
            format!("Table already exists: {}.{name}", namespace.join(".")),
            "TableAlreadyExistsException",
            StatusCode::CONFLICT.as_u16(),
            None,
        )
    }

    pub fn commit_failed(message: impl Into<String>) -> Self {
        Self::new(
            format!("Commit failed: {}", message.into()),
            "CommitFailedException",
            StatusCode::CONFLICT.as_u16(),
            None,
        )
    }

    pub fn commit_failed_with_reason(message: impl Into<String>, reason: impl Display) -> Self {
        Self::new(
            format!("Commit failed: {} (Reason: {reason})", message.into()),
            "CommitFailedException",
            StatusCode::CONFLICT.as_u16(),
            None,
        )
    }

    pub fn conflict(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(message, r#type, StatusCode::CONFLICT.as_u16(), source)
    }

    pub fn internal(
        message: impl Into<String>,
        r#type: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(
            message,
            r#type,
            StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            source,
        )
    }

    pub fn service_unavailable(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::new(
            message,
            "ServiceUnavailableException",
            StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            source,
        )
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(
            message,
            "GatewayTimeoutException",
            StatusCode::GATEWAY_TIMEOUT.as_u16(),
            None,
        )
    }

    #[must_use]
    pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
        self.stack.push(detail.into());
        self
    }
}

impl axum::response::IntoResponse for ErrorModel {
    fn into_response(self) -> axum::http::Response<axum::body::Body> {
        IcebergErrorResponse { error: self }.into_response()
    }
}

impl axum::response::IntoResponse for IcebergErrorResponse {
    fn into_response(self) -> axum::http::Response<axum::body::Body> {
        let Self { error } = self;
        let ErrorModel {
            message,
            r#type,
            code,
            source: _source,
            stack,
        } = error;

        // Stack details are hidden from the client on 5xx responses and only logged.
        let mut response = if code >= 500 {
            tracing::error!(
                error_type = %r#type,
                code,
                message = %message,
                stack = ?stack,
                "Internal server error response"
            );
            axum::Json(IcebergErrorResponse {
                error: ErrorModel {
                    message,
                    r#type,
                    code,
                    source: None,
                    stack: Vec::new(),
                },
            })
            .into_response()
        } else {
            tracing::debug!(
                error_type = %r#type,
                code,
                message = %message,
                stack = ?stack,
                "Error response"
            );
            axum::Json(IcebergErrorResponse {
                error: ErrorModel {
                    message,
                    r#type,
                    code,
                    source: None,
                    stack,
                },
            })
            .into_response()
        };

        *response.status_mut() = axum::http::StatusCode::from_u16(code)
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        response
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn test_error_response_serialization() {
        let val = IcebergErrorResponse {
            error: ErrorModel::builder()
                .message("The server does not support this operation")
                .r#type("UnsupportedOperationException")
                .code(StatusCode::NOT_ACCEPTABLE.as_u16())
                .build(),
        };
        let resp = axum::response::IntoResponse::into_response(val);
        assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);

        let buf = resp.into_body().collect().await.unwrap().to_bytes();
        let resp: IcebergErrorResponse = serde_json::from_slice(&buf).unwrap();
        assert_eq!(
            resp.error.message,
            "The server does not support this operation"
        );
        assert_eq!(resp.error.r#type, "UnsupportedOperationException");
        assert_eq!(resp.error.code, 406);

        let json = serde_json::json!({"error": {
            "message": "The server does not support this operation",
            "type": "UnsupportedOperationException",
            "code": 406
        }});

        let resp: IcebergErrorResponse = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(serde_json::to_value(resp).unwrap(), json);
    }

    #[test]
    fn test_error_model_display() {
        let error = ErrorModel::builder()
            .message("Something went wrong")
            .r#type("TestError")
            .code(500)
            .build();

        let display_output = format!("{error}");
        assert!(display_output.contains("Something went wrong"));
        assert!(display_output.contains("TestError"));
        assert!(display_output.contains("500"));
        assert!(!display_output.contains("Stack:"));
        assert!(!display_output.contains("Caused by:"));

        let source_error = Box::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ))
            as Box<dyn std::error::Error + Send + Sync + 'static>;

        let error_with_source = ErrorModel::builder()
            .message("IO operation failed")
            .r#type("IOError")
            .code(404)
            .source(Some(source_error))
            .stack(vec!["io_stack".to_string()])
            .build();

        let display_output = format!("{error_with_source}");
        assert!(display_output.contains("IO operation failed"));
        assert!(display_output.contains("Stack:"));
        assert!(display_output.contains("  io_stack"));
        assert_eq!(display_output.matches("Caused by:").count(), 1);
        assert!(display_output.contains("File not found"));
    }

    #[tokio::test]
    async fn test_into_response_server_error_redacts_stack() {
        let val = IcebergErrorResponse {
            error: ErrorModel::builder()
                .message("internal error")
                .r#type("InternalServerErrorException")
                .code(500)
                .stack(vec!["secret detail".into()])
                .build(),
        };
        let resp = axum::response::IntoResponse::into_response(val);
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let buf = resp.into_body().collect().await.unwrap().to_bytes();
        let parsed: IcebergErrorResponse = serde_json::from_slice(&buf).unwrap();
        assert!(parsed.error.stack.is_empty());
    }

    #[tokio::test]
    async fn test_into_response_client_error_preserves_stack() {
        let val = IcebergErrorResponse {
            error: ErrorModel::builder()
                .message("bad input")
                .r#type("BadRequestException")
                .code(400)
                .stack(vec!["user detail".into()])
                .build(),
        };
        let resp = axum::response::IntoResponse::into_response(val);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let buf = resp.into_body().collect().await.unwrap().to_bytes();
        let parsed: IcebergErrorResponse = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed.error.stack, vec!["user detail".to_string()]);
    }

    #[test]
    fn test_domain_constructors() {
        let ns = vec!["db".to_string(), "schema".to_string()];
        let err = ErrorModel::no_such_namespace(&ns);
        assert_eq!(err.code, 404);
        assert_eq!(err.r#type, "NoSuchNamespaceException");
        assert!(err.message.contains("db.schema"));

        let err = ErrorModel::table_already_exists(&ns, "t");
        assert_eq!(err.code, 409);
        assert!(err.message.contains("db.schema.t"));

        let err = ErrorModel::commit_failed_with_reason(
            "Optimistic lock failed: metadata location has changed.",
            "expected a, found b",
        );
        assert_eq!(err.code, 409);
        assert_eq!(err.r#type, "CommitFailedException");
        assert!(err.message.starts_with("Commit failed: "));
        assert!(err.message.contains("(Reason: expected a, found b)"));
    }
}
