use std::sync::Arc;

use openerp_search::{Page, Query, SearchEngine};

use super::IndexError;
use crate::model::{
    UserDoc, FIELD_ACTIVE, FIELD_EMAIL, FIELD_LOGIN, FIELD_NAME, FIELD_SCM_ACCOUNTS,
    USER_COLLECTION, USER_FIELDS,
};

/// Cap of the account lookup.
const ACCOUNT_LOOKUP_LIMIT: usize = 3;

/// Filters of a user search.
///
/// Built with [`UserQuery::builder`]. By default only active users match and
/// there is no text filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    text_query: Option<String>,
    active: bool,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            text_query: None,
            active: true,
        }
    }
}

impl UserQuery {
    /// Longest accepted text filter, in bytes. Substring matching compiles
    /// the text into an automaton whose size grows with it.
    pub const MAX_TEXT_QUERY_LENGTH: usize = 200;

    pub fn builder() -> UserQueryBuilder {
        UserQueryBuilder::default()
    }

    pub fn text_query(&self) -> Option<&str> {
        self.text_query.as_deref()
    }

    pub fn active(&self) -> bool {
        self.active
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserQueryBuilder {
    query: UserQuery,
}

impl UserQueryBuilder {
    /// Text matched as a case-insensitive substring of login, name or email.
    /// Surrounding whitespace is trimmed; a blank text means no text filter.
    pub fn text_query(mut self, text: Option<&str>) -> Self {
        self.query.text_query = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.query.active = active;
        self
    }

    pub fn build(self) -> UserQuery {
        self.query
    }
}

/// Paging of a user search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    offset: usize,
    limit: usize,
}

impl SearchOptions {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 500;
    /// Results past this position cannot be paged to.
    pub const MAX_RESULT_WINDOW: usize = 10_000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_offset(&mut self, offset: usize) -> Result<&mut Self, IndexError> {
        check_window(offset, self.limit)?;
        self.offset = offset;
        Ok(self)
    }

    /// Set the page size. Values above [`Self::MAX_LIMIT`] are capped.
    pub fn set_limit(&mut self, limit: usize) -> Result<&mut Self, IndexError> {
        if limit == 0 {
            return Err(IndexError::Validation("limit must be positive".into()));
        }
        let limit = limit.min(Self::MAX_LIMIT);
        check_window(self.offset, limit)?;
        self.limit = limit;
        Ok(self)
    }

    /// Select the 1-based `page` of `page_size` results. The page must end
    /// within [`Self::MAX_RESULT_WINDOW`].
    pub fn set_page(&mut self, page: usize, page_size: usize) -> Result<&mut Self, IndexError> {
        if page == 0 {
            return Err(IndexError::Validation("page must be strictly positive".into()));
        }
        if page_size == 0 {
            return Err(IndexError::Validation("limit must be positive".into()));
        }
        let limit = page_size.min(Self::MAX_LIMIT);
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| window_exceeded(usize::MAX))?;
        check_window(offset, limit)?;
        self.offset = offset;
        self.limit = limit;
        Ok(self)
    }

    fn page(&self) -> Page {
        Page::new(self.offset, self.limit)
    }
}

fn check_window(offset: usize, limit: usize) -> Result<(), IndexError> {
    match offset.checked_add(limit) {
        Some(end) if end <= SearchOptions::MAX_RESULT_WINDOW => Ok(()),
        Some(end) => Err(window_exceeded(end)),
        None => Err(window_exceeded(usize::MAX)),
    }
}

fn window_exceeded(end: usize) -> IndexError {
    IndexError::Validation(format!(
        "result window too large: offset + limit = {} exceeds {}",
        end,
        SearchOptions::MAX_RESULT_WINDOW
    ))
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One page of a user search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub docs: Vec<UserDoc>,
    /// Number of matching users over all pages.
    pub total: usize,
}

/// Read-only queries over the user documents.
pub struct UserIndex {
    search: Arc<dyn SearchEngine>,
}

impl UserIndex {
    pub fn new(search: Arc<dyn SearchEngine>) -> Result<Self, IndexError> {
        search.define(USER_COLLECTION, USER_FIELDS)?;
        Ok(Self { search })
    }

    /// Active users whose login equals `term`, whose email equals it ignoring
    /// case, or who have an SCM account equal to it ignoring case.
    ///
    /// At most three users are returned. When more match, which three is not
    /// part of the contract; every returned user is a true match.
    pub fn get_at_most_three_active_users_for_scm_account(
        &self,
        term: &str,
    ) -> Result<Vec<UserDoc>, IndexError> {
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::And(vec![
            Query::flag(FIELD_ACTIVE, true),
            Query::Or(vec![
                Query::term(FIELD_LOGIN, term),
                Query::term(FIELD_EMAIL, term),
                Query::term(FIELD_SCM_ACCOUNTS, term),
            ]),
        ]);
        let page = self
            .search
            .search(USER_COLLECTION, &query, Page::first(ACCOUNT_LOOKUP_LIMIT))?;
        page.documents.iter().map(UserDoc::from_document).collect()
    }

    /// Users matching `query`, ordered by uuid and paged by `options`.
    pub fn search(
        &self,
        query: &UserQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, IndexError> {
        let mut filters = vec![Query::flag(FIELD_ACTIVE, query.active())];
        if let Some(text) = query.text_query() {
            if text.len() > UserQuery::MAX_TEXT_QUERY_LENGTH {
                return Err(IndexError::Validation(format!(
                    "text query is {} bytes long, at most {} allowed",
                    text.len(),
                    UserQuery::MAX_TEXT_QUERY_LENGTH
                )));
            }
            filters.push(Query::Or(vec![
                Query::contains(FIELD_LOGIN, text),
                Query::contains(FIELD_NAME, text),
                Query::contains(FIELD_EMAIL, text),
            ]));
        }

        let page = self
            .search
            .search(USER_COLLECTION, &Query::And(filters), options.page())?;
        let docs = page
            .documents
            .iter()
            .map(UserDoc::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SearchResult {
            docs,
            total: page.total,
        })
    }
}
