pub mod user;

pub use user::{
    NewUser, UserDoc, UserRow, FIELD_ACTIVE, FIELD_EMAIL, FIELD_LOGIN, FIELD_NAME,
    FIELD_SCM_ACCOUNTS, USER_COLLECTION, USER_FIELDS,
};
