//! Field mappings: how each document field is stored and matched.
//!
//! A collection is declared with a static list of [`FieldMapping`]s. Each
//! field names its value kind and the matchers queries may use against it:
//!
//! ```ignore
//! const FIELDS: &[FieldMapping] = &[
//!     FieldMapping::text("login", &[Matcher::Exact(Case::Sensitive), Matcher::Substring]),
//!     FieldMapping::text_list("scm_accounts", &[Matcher::Exact(Case::Insensitive)]),
//!     FieldMapping::flag("active"),
//! ];
//! ```

use crate::error::SearchError;

/// Case handling of an exact matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Sensitive,
    Insensitive,
}

/// A way a text field can be matched by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Whole-value equality.
    Exact(Case),
    /// Case-insensitive containment of the query string.
    Substring,
}

/// Value kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single string.
    Text,
    /// An ordered list of strings; a matcher hits if any element matches.
    TextList,
    /// A boolean, matched with `Query::Flag`.
    Flag,
}

/// Declaration of one document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: &'static str,
    pub kind: FieldKind,
    pub matchers: &'static [Matcher],
}

impl FieldMapping {
    pub const fn text(name: &'static str, matchers: &'static [Matcher]) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            matchers,
        }
    }

    pub const fn text_list(name: &'static str, matchers: &'static [Matcher]) -> Self {
        Self {
            name,
            kind: FieldKind::TextList,
            matchers,
        }
    }

    pub const fn flag(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Flag,
            matchers: &[],
        }
    }

    /// Case of the exact matcher, if the field declares one.
    pub fn exact_case(&self) -> Option<Case> {
        self.matchers.iter().find_map(|m| match m {
            Matcher::Exact(case) => Some(*case),
            Matcher::Substring => None,
        })
    }

    pub fn has_substring(&self) -> bool {
        self.matchers.contains(&Matcher::Substring)
    }
}

/// Check a collection's mapping before an index is built for it.
pub fn validate(fields: &[FieldMapping]) -> Result<(), SearchError> {
    for (i, field) in fields.iter().enumerate() {
        if field.name.is_empty() || field.name.starts_with('_') || field.name.contains("__") {
            return Err(SearchError::Schema(format!(
                "invalid field name '{}'",
                field.name
            )));
        }
        if fields[..i].iter().any(|f| f.name == field.name) {
            return Err(SearchError::Schema(format!(
                "duplicate field '{}'",
                field.name
            )));
        }
        let exact = field
            .matchers
            .iter()
            .filter(|m| matches!(m, Matcher::Exact(_)))
            .count();
        if exact > 1 {
            return Err(SearchError::Schema(format!(
                "field '{}' declares more than one exact matcher",
                field.name
            )));
        }
        if field.kind == FieldKind::Flag && !field.matchers.is_empty() {
            return Err(SearchError::Schema(format!(
                "flag field '{}' cannot declare text matchers",
                field.name
            )));
        }
    }
    Ok(())
}
