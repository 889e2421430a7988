use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Account record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,        // argon2 PHC string
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub date_joined: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

/// Account not yet persisted; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Contact fields writable through the edit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountChanges {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// One-to-one extension of an account.
#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,                // owner, never rewritten
    pub date_of_birth: Option<Date>,
    pub photo: Option<String>,        // object storage key
}

/// Full replacement of the profile's editable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChanges {
    pub date_of_birth: Option<Date>,
    pub photo: Option<String>,
}
