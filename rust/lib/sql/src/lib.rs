pub mod error;
pub mod sqlite;
pub mod traits;

pub use error::SQLError;
pub use sqlite::{SqliteSession, SqliteStore};
pub use traits::{Row, SQLStore, SqlExecutor, SqlSession, Value};
