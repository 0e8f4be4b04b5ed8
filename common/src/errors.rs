// Error handling framework

use thiserror::Error;

/// Definition-time validation errors for stored SQL fragments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Dangerous command detected: {keyword}. This command is not allowed for security reasons")]
    DangerousCommand { keyword: String },

    #[error("Suspicious pattern detected: {pattern}. Rejected for security reasons")]
    SuspiciousPattern { pattern: String },

    #[error("The {clause} clause cannot be empty")]
    EmptyClause { clause: String },

    #[error("The SELECT clause must not contain FROM or WHERE. Those belong in their own fields")]
    MisplacedKeyword,

    #[error("The clause must start with FROM")]
    MissingFromKeyword,

    #[error("Missing ON clauses: found {joins} JOINs but only {ons} ON")]
    JoinOnMismatch { joins: usize, ons: usize },

    #[error("Placeholder positions must start at %1")]
    PlaceholderNotStartingAtOne,

    #[error("Invalid table name: {0}. Use the format schema.table or table")]
    InvalidTableName(String),

    #[error("Invalid {data_type} value: {value}")]
    InvalidValue { data_type: String, value: String },

    #[error("The parameter '{0}' is required")]
    MissingParameter(String),

    #[error("The parameter '{0}' cannot be empty")]
    EmptyParameter(String),

    #[error("The internal name cannot contain whitespace. Use underscores (_)")]
    InternalNameWithWhitespace,

    #[error("Unknown data type: {0}")]
    UnknownDataType(String),
}

/// Execution-time errors surfaced by the orchestrator
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to build SQL: {0}")]
    BuildFailed(#[from] ValidationError),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Execution timeout after {0} seconds")]
    Timeout(u64),

    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),
}

/// Result export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Execution failed before export: {0}")]
    ExecutionFailed(String),

    #[error("Spreadsheet generation failed: {0}")]
    SpreadsheetFailed(String),

    #[error("CSV generation failed: {0}")]
    CsvFailed(String),
}

/// API response error type for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::new("VALIDATION_ERROR", err.to_string())
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        ApiError::new("EXECUTION_ERROR", err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        let code = match err {
            DatabaseError::NotFound(_) => "NOT_FOUND",
            DatabaseError::DuplicateKey(_) => "CONFLICT",
            _ => "DATABASE_ERROR",
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        ApiError::new("EXPORT_ERROR", err.to_string())
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangerous_command_display() {
        let err = ValidationError::DangerousCommand {
            keyword: "DROP".to_string(),
        };
        assert!(err.to_string().contains("DROP"));
    }

    #[test]
    fn test_join_on_mismatch_display() {
        let err = ValidationError::JoinOnMismatch { joins: 2, ons: 1 };
        assert!(err.to_string().contains("2 JOINs"));
        assert!(err.to_string().contains("1 ON"));
    }

    #[test]
    fn test_database_error_to_api_error() {
        let err = DatabaseError::NotFound("query".to_string());
        let api_err: ApiError = err.into();
        assert_eq!(api_err.code, "NOT_FOUND");
    }

    #[test]
    fn test_api_error_with_details() {
        let err = ApiError::new("TEST_ERROR", "Test message")
            .with_details(serde_json::json!({"field": "value"}));
        assert!(err.details.is_some());
    }
}
