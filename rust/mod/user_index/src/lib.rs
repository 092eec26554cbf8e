//! User search index.
//!
//! Keeps a search index of user documents in sync with the relational
//! `users` table and answers account lookups and user searches from it.
//!
//! - [`UserIndexer`] is the only writer. It rebuilds the whole index
//!   ([`UserIndexer::index_all`], [`UserIndexer::index_on_startup`]) or
//!   commits a write session and indexes the users it touched
//!   ([`UserIndexer::commit_and_index_all`]).
//! - [`UserIndex`] is read-only.

pub mod config;
pub mod model;
pub mod service;

use std::fs;
use std::sync::Arc;

use openerp_search::{SearchEngine, TantivyEngine};
use openerp_sql::{SQLStore, SqliteStore};
use tracing::info;

pub use config::UserIndexConfig;
pub use model::{NewUser, UserDoc, UserRow};
pub use service::{
    IndexError, IndexerConfig, IndexingResult, SearchOptions, SearchResult, UserIndex,
    UserIndexer, UserQuery, UserTable,
};

/// The relational store, the search engine, and the indexer and query
/// engine wired on top of them.
pub struct UserIndexModule {
    sql: Arc<dyn SQLStore>,
    indexer: UserIndexer,
    index: UserIndex,
}

impl UserIndexModule {
    /// Wire the module on existing stores. Creates the `users` table if needed.
    pub fn new(
        sql: Arc<dyn SQLStore>,
        search: Arc<dyn SearchEngine>,
        config: IndexerConfig,
    ) -> Result<Self, IndexError> {
        service::schema::init_schema(&*sql)?;
        let indexer = UserIndexer::new(sql.clone(), search.clone(), config)?;
        let index = UserIndex::new(search)?;
        Ok(Self {
            sql,
            indexer,
            index,
        })
    }

    /// Open the embedded SQLite database and tantivy indexes named by `config`.
    pub fn open(config: &UserIndexConfig) -> Result<Self, IndexError> {
        let sqlite_path = config.resolve_sqlite_path();
        let search_dir = config.resolve_search_dir();
        if let Some(parent) = sqlite_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| IndexError::Storage(e.to_string()))?;
            }
        }

        info!(
            "opening user index: sqlite={} search={}",
            sqlite_path.display(),
            search_dir.display()
        );
        let sql = SqliteStore::open(&sqlite_path)?;
        let search =
            TantivyEngine::open(&search_dir).map_err(|e| IndexError::Indexing(e.to_string()))?;
        Self::new(Arc::new(sql), Arc::new(search), config.indexer())
    }

    pub fn indexer(&self) -> &UserIndexer {
        &self.indexer
    }

    pub fn index(&self) -> &UserIndex {
        &self.index
    }

    /// The relational store, for opening write sessions.
    pub fn sql(&self) -> &dyn SQLStore {
        self.sql.as_ref()
    }
}
