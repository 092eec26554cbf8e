use crate::document::Document;

/// A structured query over one collection.
///
/// Text matchers are resolved against the collection mapping: `Term` uses the
/// field's exact matcher (with its case rule), `Contains` its substring
/// matcher. Naming a matcher the field does not declare is a query error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every document.
    All,
    /// Field value (or any list element) equals `value`.
    Term { field: String, value: String },
    /// Field value (or any list element) contains `value`, ignoring case.
    Contains { field: String, value: String },
    /// Boolean field equals `value`.
    Flag { field: String, value: bool },
    /// Every sub-query matches. Empty matches everything.
    And(Vec<Query>),
    /// At least one sub-query matches. Empty matches nothing.
    Or(Vec<Query>),
}

impl Query {
    pub fn term(field: &str, value: &str) -> Self {
        Query::Term {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Query::Contains {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn flag(field: &str, value: bool) -> Self {
        Query::Flag {
            field: field.to_string(),
            value,
        }
    }
}

/// Window of results to return, over matches ordered by document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

/// One page of matching documents plus the total number of matches.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub documents: Vec<Document>,
    pub total: usize,
}
