use std::collections::{BTreeSet, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use openerp_search::{Document, SearchEngine};
use openerp_sql::{SQLStore, SqlSession};
use tracing::{debug, info, warn};

use super::IndexError;
use super::user::UserTable;
use crate::model::{UserDoc, UserRow, USER_COLLECTION, USER_FIELDS};

/// Default number of rows read and indexed per batch during a rebuild.
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Rows per keyset page and per index commit on full rebuilds.
    pub batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Outcome of one indexing call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingResult {
    /// Documents written (created or replaced).
    pub indexed: usize,
    /// Documents deleted because their row no longer exists.
    pub removed: usize,
}

/// Synchronizes the relational `users` table into the search index.
///
/// The indexer is the only writer of user documents. Every write is
/// visible to [`UserIndex`](super::UserIndex) queries when the call returns.
pub struct UserIndexer {
    sql: Arc<dyn SQLStore>,
    search: Arc<dyn SearchEngine>,
    config: IndexerConfig,
}

impl UserIndexer {
    /// Create an indexer and declare the user collection on the search engine.
    pub fn new(
        sql: Arc<dyn SQLStore>,
        search: Arc<dyn SearchEngine>,
        config: IndexerConfig,
    ) -> Result<Self, IndexError> {
        if config.batch_size == 0 {
            return Err(IndexError::Validation("batch_size must be positive".into()));
        }
        search
            .define(USER_COLLECTION, USER_FIELDS)
            .map_err(|e| IndexError::Indexing(e.to_string()))?;
        Ok(Self { sql, search, config })
    }

    /// Full rebuild run when the process starts.
    ///
    /// Users in `excluded` are neither indexed nor removed; their documents
    /// are left exactly as they are.
    pub fn index_on_startup(&self, excluded: &HashSet<String>) -> Result<IndexingResult, IndexError> {
        info!("indexing users on startup ({} excluded)", excluded.len());
        self.rebuild(excluded)
    }

    /// Full rebuild of every user document from the table.
    pub fn index_all(&self) -> Result<IndexingResult, IndexError> {
        self.rebuild(&HashSet::new())
    }

    /// Commit `session`, then index `user`.
    pub fn commit_and_index(
        &self,
        session: Box<dyn SqlSession + '_>,
        user: &UserRow,
    ) -> Result<IndexingResult, IndexError> {
        self.commit_and_index_all(session, std::slice::from_ref(user))
    }

    /// Commit `session`, then index exactly the given users.
    ///
    /// Each user is re-read by uuid inside the session so the document holds
    /// what was committed, not what the caller passed in. A user whose row
    /// is gone has its document removed. Other documents are not touched.
    /// Nothing is indexed if the commit fails.
    pub fn commit_and_index_all(
        &self,
        session: Box<dyn SqlSession + '_>,
        users: &[UserRow],
    ) -> Result<IndexingResult, IndexError> {
        let uuids: Vec<String> = users
            .iter()
            .map(|u| u.uuid.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = UserTable::select_by_uuids(&*session, &uuids)?;
        session.commit()?;

        let mut missing: BTreeSet<String> = uuids.into_iter().collect();
        for row in &rows {
            missing.remove(&row.uuid);
        }

        let indexed = self.put(&rows)?;
        let removed = self.remove(missing.into_iter().collect())?;
        debug!("indexed {} users after commit, removed {}", indexed, removed);

        Ok(IndexingResult { indexed, removed })
    }

    /// Walk the table in uuid order, one page per batch. Each page is
    /// indexed, then index ids in the uuid range the page covers are swept:
    /// those without a row in the page are stale. Memory stays bounded by
    /// the batch size on both sides.
    fn rebuild(&self, excluded: &HashSet<String>) -> Result<IndexingResult, IndexError> {
        let mut result = IndexingResult::default();
        let mut last: Option<String> = None;
        loop {
            let page = UserTable::select_page_after(
                &*self.sql,
                last.as_deref(),
                self.config.batch_size,
            )?;
            let full = page.len() == self.config.batch_size;
            // A short page is the last one and covers every later uuid.
            let upto = if full {
                page.last().map(|u| u.uuid.clone())
            } else {
                None
            };
            let present: HashSet<String> = page.iter().map(|u| u.uuid.clone()).collect();

            let batch: Vec<UserRow> = page
                .into_iter()
                .filter(|u| !excluded.contains(&u.uuid))
                .collect();
            result.indexed += self.put(&batch)?;
            debug!("indexed batch of {} users", batch.len());

            result.removed +=
                self.sweep(last.as_deref(), upto.as_deref(), &present, excluded)?;

            match upto {
                Some(uuid) => last = Some(uuid),
                None => break,
            }
        }

        info!(
            "user index rebuilt: {} indexed, {} removed",
            result.indexed, result.removed
        );
        Ok(result)
    }

    /// Remove documents with an id in `(after, upto]` that is neither in
    /// `present` nor `excluded`. Ids are read in batches.
    fn sweep(
        &self,
        after: Option<&str>,
        upto: Option<&str>,
        present: &HashSet<String>,
        excluded: &HashSet<String>,
    ) -> Result<usize, IndexError> {
        let upper = match upto {
            Some(uuid) => Bound::Included(uuid),
            None => Bound::Unbounded,
        };
        let mut removed = 0;
        let mut cursor = after.map(str::to_string);
        loop {
            let lower = match cursor.as_deref() {
                Some(uuid) => Bound::Excluded(uuid),
                None => Bound::Unbounded,
            };
            let ids = self
                .search
                .get_ids(USER_COLLECTION, lower, upper, self.config.batch_size)
                .map_err(|e| IndexError::Indexing(e.to_string()))?;
            let full = ids.len() == self.config.batch_size;
            let Some(tail) = ids.last().cloned() else {
                break;
            };

            let stale: Vec<String> = ids
                .into_iter()
                .filter(|id| !present.contains(id) && !excluded.contains(id))
                .collect();
            if !stale.is_empty() {
                warn!("removing {} user documents with no row", stale.len());
            }
            removed += self.remove(stale)?;

            if !full {
                break;
            }
            cursor = Some(tail);
        }
        Ok(removed)
    }

    fn put(&self, users: &[UserRow]) -> Result<usize, IndexError> {
        if users.is_empty() {
            return Ok(0);
        }
        let docs: Vec<Document> = users
            .iter()
            .map(|u| UserDoc::from(u).to_document())
            .collect();
        self.search
            .put_documents(USER_COLLECTION, &docs)
            .map_err(|e| IndexError::Indexing(e.to_string()))?;
        Ok(docs.len())
    }

    fn remove(&self, uuids: Vec<String>) -> Result<usize, IndexError> {
        if uuids.is_empty() {
            return Ok(0);
        }
        self.search
            .delete_documents(USER_COLLECTION, &uuids)
            .map_err(|e| IndexError::Indexing(e.to_string()))?;
        Ok(uuids.len())
    }
}
