use thiserror::Error;

/// Errors raised by the retrieval pipeline.
///
/// The store and the embedding/completion clients raise these typed
/// variants; the CLI and HTTP layers translate them into user-visible
/// messages.
#[derive(Error, Debug)]
pub enum TriageError {
    /// The store could not be reached or initialized. Fail fast — callers
    /// must not partially proceed.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A record violated the collection schema (missing required field,
    /// wrong vector dimension). Aborts the record or batch.
    #[error("schema violation: {0}")]
    Schema(String),

    /// Search was attempted before the collection's index was loaded.
    /// Distinct from an empty result set.
    #[error("collection '{0}' is not loaded; call load before searching")]
    CollectionNotReady(String),

    /// The upstream embedding service failed, rate-limited past the retry
    /// budget, or returned a vector of the wrong dimension.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// The completion service returned a payload that could not be decoded.
    #[error("completion response could not be parsed: {0}")]
    CompletionParse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
