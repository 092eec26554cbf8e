pub mod document;
pub mod error;
pub mod mapping;
pub mod query;
pub mod tantivy;
pub mod traits;

pub use document::{Document, FieldValue};
pub use error::SearchError;
pub use mapping::{Case, FieldKind, FieldMapping, Matcher};
pub use query::{Page, Query, SearchPage};
pub use self::tantivy::TantivyEngine;
pub use traits::SearchEngine;
