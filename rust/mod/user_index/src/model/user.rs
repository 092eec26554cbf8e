use openerp_search::{Case, Document, FieldMapping, FieldValue, Matcher};
use serde::{Deserialize, Serialize};

use crate::service::IndexError;

/// Search collection holding one document per user.
pub const USER_COLLECTION: &str = "users";

pub const FIELD_LOGIN: &str = "login";
pub const FIELD_NAME: &str = "name";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_ACTIVE: &str = "active";
pub const FIELD_SCM_ACCOUNTS: &str = "scm_accounts";

/// Matching rules of the user collection.
///
/// Login is exact case-sensitive; email and SCM accounts are exact
/// case-insensitive. Login, name and email also match by substring.
pub const USER_FIELDS: &[FieldMapping] = &[
    FieldMapping::text(FIELD_LOGIN, &[Matcher::Exact(Case::Sensitive), Matcher::Substring]),
    FieldMapping::text(FIELD_NAME, &[Matcher::Substring]),
    FieldMapping::text(FIELD_EMAIL, &[Matcher::Exact(Case::Insensitive), Matcher::Substring]),
    FieldMapping::flag(FIELD_ACTIVE),
    FieldMapping::text_list(FIELD_SCM_ACCOUNTS, &[Matcher::Exact(Case::Insensitive)]),
];

/// A row of the relational `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    /// Stable identifier (UUIDv4, no dashes). Never changes.
    pub uuid: String,

    /// Unique login, case-sensitive.
    pub login: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub active: bool,

    /// Version-control aliases, in declaration order.
    #[serde(default)]
    pub scm_accounts: Vec<String>,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

/// Input for creating a user row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub scm_accounts: Vec<String>,
}

/// The denormalized user document held by the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDoc {
    pub uuid: String,
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub scm_accounts: Vec<String>,
}

impl From<&UserRow> for UserDoc {
    fn from(row: &UserRow) -> Self {
        Self {
            uuid: row.uuid.clone(),
            login: row.login.clone(),
            name: row.name.clone(),
            email: row.email.clone(),
            active: row.active,
            scm_accounts: row.scm_accounts.clone(),
        }
    }
}

impl UserDoc {
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new(self.uuid.as_str())
            .with(FIELD_LOGIN, FieldValue::Text(self.login.clone()))
            .with(FIELD_ACTIVE, FieldValue::Flag(self.active))
            .with(FIELD_SCM_ACCOUNTS, FieldValue::TextList(self.scm_accounts.clone()));
        if let Some(ref name) = self.name {
            doc = doc.with(FIELD_NAME, FieldValue::Text(name.clone()));
        }
        if let Some(ref email) = self.email {
            doc = doc.with(FIELD_EMAIL, FieldValue::Text(email.clone()));
        }
        doc
    }

    pub fn from_document(doc: &Document) -> Result<Self, IndexError> {
        let login = doc
            .text(FIELD_LOGIN)
            .ok_or_else(|| IndexError::Query(format!("user document {} has no login", doc.id)))?;
        let active = doc
            .flag(FIELD_ACTIVE)
            .ok_or_else(|| IndexError::Query(format!("user document {} has no active flag", doc.id)))?;

        Ok(Self {
            uuid: doc.id.clone(),
            login: login.to_string(),
            name: doc.text(FIELD_NAME).map(str::to_string),
            email: doc.text(FIELD_EMAIL).map(str::to_string),
            active,
            scm_accounts: doc.text_list(FIELD_SCM_ACCOUNTS).unwrap_or_default().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> UserDoc {
        UserDoc {
            uuid: "u1".into(),
            login: "jdoe".into(),
            name: Some("John Doe".into()),
            email: None,
            active: true,
            scm_accounts: vec!["John.Doe".into(), "jd".into()],
        }
    }

    #[test]
    fn document_conversion_keeps_every_field() {
        let user = doc();
        let document = user.to_document();
        assert_eq!(document.id, "u1");
        assert_eq!(document.text(FIELD_EMAIL), None);
        assert_eq!(UserDoc::from_document(&document).unwrap(), user);
    }

    #[test]
    fn document_without_login_is_rejected() {
        let document = Document::new("u1").with(FIELD_ACTIVE, FieldValue::Flag(true));
        assert!(matches!(
            UserDoc::from_document(&document),
            Err(IndexError::Query(_))
        ));
    }
}
