pub mod index;
pub mod indexer;
pub mod schema;
pub mod user;

use openerp_search::SearchError;
use openerp_sql::SQLError;
use thiserror::Error;

pub use index::{SearchOptions, SearchResult, UserIndex, UserQuery};
pub use indexer::{IndexerConfig, IndexingResult, UserIndexer};
pub use user::UserTable;

/// Error type of the user index module.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Writing to the search index failed, or a record could not be indexed.
    #[error("indexing failed: {0}")]
    Indexing(String),

    /// Reading from the search index failed, or the query was malformed.
    #[error("query failed: {0}")]
    Query(String),

    /// Relational storage failure.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A unique column already holds the value.
    #[error("{0}")]
    Conflict(String),

    /// Input data is invalid.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),
}

impl From<SQLError> for IndexError {
    fn from(e: SQLError) -> Self {
        let msg = e.to_string();
        if msg.contains("UNIQUE constraint") {
            IndexError::Conflict(msg)
        } else {
            IndexError::Storage(msg)
        }
    }
}

/// Search failures on the read path. Write paths map to `Indexing` explicitly.
impl From<SearchError> for IndexError {
    fn from(e: SearchError) -> Self {
        IndexError::Query(e.to_string())
    }
}
