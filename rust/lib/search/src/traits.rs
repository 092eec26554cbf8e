use std::ops::Bound;

use crate::document::Document;
use crate::error::SearchError;
use crate::mapping::FieldMapping;
use crate::query::{Page, Query, SearchPage};

/// SearchEngine stores documents and runs structured queries over them.
///
/// Documents are organized by collection (e.g. "users"). A collection must be
/// defined with its field mapping before it is written or read. Writes are
/// visible to queries as soon as the writing call returns.
pub trait SearchEngine: Send + Sync {
    /// Declare a collection. Defining an existing collection again is a no-op.
    fn define(&self, collection: &str, fields: &'static [FieldMapping]) -> Result<(), SearchError>;

    /// Index documents. A document whose ID already exists in the collection
    /// is replaced as a whole. All documents are committed together.
    fn put_documents(&self, collection: &str, docs: &[Document]) -> Result<(), SearchError>;

    /// Delete documents by ID. Unknown IDs are ignored.
    fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<(), SearchError>;

    /// Every document of a collection, ordered by ID.
    fn get_documents(&self, collection: &str) -> Result<Vec<Document>, SearchError>;

    /// Up to `limit` document IDs within `lower..upper`, ordered.
    ///
    /// Callers walk a large collection in windows by passing the last ID of
    /// one call as the excluded lower bound of the next.
    fn get_ids(
        &self,
        collection: &str,
        lower: Bound<&str>,
        upper: Bound<&str>,
        limit: usize,
    ) -> Result<Vec<String>, SearchError>;

    /// Number of documents in a collection.
    fn count_documents(&self, collection: &str) -> Result<usize, SearchError>;

    /// Run a query. Matches are ordered by document ID before `page` is applied.
    fn search(
        &self,
        collection: &str,
        query: &Query,
        page: Page,
    ) -> Result<SearchPage, SearchError>;
}
