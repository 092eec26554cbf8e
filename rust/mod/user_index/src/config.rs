use std::path::PathBuf;

use crate::service::IndexerConfig;
use crate::service::indexer::DEFAULT_BATCH_SIZE;

/// Storage and indexing configuration of the user index module.
///
/// The embedding process parses these from its command-line arguments and
/// hands them to [`UserIndexModule::open`](crate::UserIndexModule::open).
#[derive(Debug, Clone)]
pub struct UserIndexConfig {
    /// Base directory for every store path left unset.
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database file.
    /// Defaults to `{data_dir}/data.sqlite` if not specified.
    pub sqlite_path: Option<PathBuf>,

    /// Directory for tantivy search indexes.
    /// Defaults to `{data_dir}/search/` if not specified.
    pub search_dir: Option<PathBuf>,

    /// Rows per batch on full rebuilds.
    pub batch_size: usize,
}

impl Default for UserIndexConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sqlite_path: None,
            search_dir: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl UserIndexConfig {
    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--data-dir=PATH`
    /// - `--sqlite=PATH`
    /// - `--search-dir=PATH`
    /// - `--batch-size=N`
    ///
    /// Unknown flags are ignored. A `--batch-size` that is not a number
    /// keeps the default.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = UserIndexConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--data-dir=") {
                config.data_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--sqlite=") {
                config.sqlite_path = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--search-dir=") {
                config.search_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--batch-size=") {
                if let Ok(n) = val.parse() {
                    config.batch_size = n;
                }
            }
        }

        config
    }

    /// Resolve the SQLite database path, falling back to `{data_dir}/data.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("data.sqlite"))
    }

    /// Resolve the search index directory.
    pub fn resolve_search_dir(&self) -> PathBuf {
        self.search_dir
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("search"))
    }

    pub fn indexer(&self) -> IndexerConfig {
        IndexerConfig {
            batch_size: self.batch_size,
        }
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
