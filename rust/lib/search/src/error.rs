use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// Index storage or a write failed.
    #[error("index error: {0}")]
    Index(String),

    /// The query names an unknown field or a matcher the field lacks.
    #[error("query error: {0}")]
    Query(String),

    /// The collection is undefined or its mapping is invalid.
    #[error("schema error: {0}")]
    Schema(String),
}
