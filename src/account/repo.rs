use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Account, AccountChanges, NewAccount, Profile, ProfileChanges};

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, new: NewAccount) -> anyhow::Result<Account>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>>;
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<Account>>;
    async fn username_exists(&self, username: &str) -> anyhow::Result<bool>;
    async fn email_exists(&self, email: &str) -> anyhow::Result<bool>;
    async fn update(&self, id: Uuid, changes: &AccountChanges) -> anyhow::Result<Account>;
    async fn touch_last_login(&self, id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create the empty profile of a freshly registered account.
    async fn create(&self, owner: Uuid) -> anyhow::Result<Profile>;
    async fn fetch_by_owner(&self, owner: Uuid) -> anyhow::Result<Option<Profile>>;
    async fn update(&self, owner: Uuid, changes: &ProfileChanges) -> anyhow::Result<Profile>;
}

const ACCOUNT_COLUMNS: &str =
    "id, username, password_hash, first_name, last_name, email, is_active, date_joined, last_login";

pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create(&self, new: NewAccount) -> anyhow::Result<Account> {
        let sql = format!(
            r#"
            INSERT INTO accounts (id, username, password_hash, first_name, last_name, email)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.username)
            .bind(&new.password_hash)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.email)
            .fetch_one(&self.db)
            .await
            .context("insert account")?;
        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select account by id")?;
        Ok(account)
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .context("select account by username")?;
        Ok(account)
    }

    async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM accounts WHERE username = $1)"#)
                .bind(username)
                .fetch_one(&self.db)
                .await
                .context("check username")?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> anyhow::Result<bool> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM accounts WHERE email = $1)"#)
                .bind(email)
                .fetch_one(&self.db)
                .await
                .context("check email")?;
        Ok(exists)
    }

    async fn update(&self, id: Uuid, changes: &AccountChanges) -> anyhow::Result<Account> {
        let sql = format!(
            r#"
            UPDATE accounts
               SET first_name = $2, last_name = $3, email = $4
             WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(&changes.first_name)
            .bind(&changes.last_name)
            .bind(&changes.email)
            .fetch_one(&self.db)
            .await
            .context("update account")?;
        Ok(account)
    }

    async fn touch_last_login(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE accounts SET last_login = $2 WHERE id = $1"#)
            .bind(id)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.db)
            .await
            .context("update last_login")?;
        Ok(())
    }
}

pub struct PgProfileStore {
    db: PgPool,
}

impl PgProfileStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn create(&self, owner: Uuid) -> anyhow::Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, user_id)
            VALUES ($1, $2)
            RETURNING id, user_id, date_of_birth, photo
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .fetch_one(&self.db)
        .await
        .context("insert profile")?;
        Ok(profile)
    }

    async fn fetch_by_owner(&self, owner: Uuid) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"SELECT id, user_id, date_of_birth, photo FROM profiles WHERE user_id = $1"#,
        )
        .bind(owner)
        .fetch_optional(&self.db)
        .await
        .context("select profile by owner")?;
        Ok(profile)
    }

    async fn update(&self, owner: Uuid, changes: &ProfileChanges) -> anyhow::Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
               SET date_of_birth = $2, photo = $3
             WHERE user_id = $1
            RETURNING id, user_id, date_of_birth, photo
            "#,
        )
        .bind(owner)
        .bind(changes.date_of_birth)
        .bind(changes.photo.as_deref())
        .fetch_one(&self.db)
        .await
        .context("update profile")?;
        Ok(profile)
    }
}
