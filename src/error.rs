use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    #[error("Malformed locator: {0}")]
    MalformedLocator(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Operation failed in read-only mode")]
    ReadOnlyMode,

    #[error("Failed to update resource: {0}")]
    UpdateFailed(String),

    #[error("Failed to delete resource: {0}")]
    DeleteFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationFailed(String),

    #[error("Deserialization error: {0}")]
    DeserializationFailed(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
