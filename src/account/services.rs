use std::time::Duration;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::forms::{Credentials, PhotoAction, ProfileEdit, Registration, ValidPhoto};
use super::password::{hash_password, verify_dummy, verify_password};
use super::repo::AccountStore;
use super::repo_types::{Account, AccountChanges, NewAccount, Profile, ProfileChanges};
use crate::state::AppState;
use crate::storage::StorageError;

const PHOTO_URL_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug)]
pub enum LoginOutcome {
    /// The form was missing a field.
    Incomplete,
    InvalidCredentials,
    Disabled,
    Succeeded(Account),
}

/// Account matching the credentials, whether active or not.
///
/// Unknown usernames still pay for one password verification.
pub async fn authenticate(
    accounts: &dyn AccountStore,
    creds: &Credentials,
) -> anyhow::Result<Option<Account>> {
    let Some(account) = accounts.find_by_username(&creds.username).await? else {
        verify_dummy(&creds.password);
        debug!(username = %creds.username, "login unknown username");
        return Ok(None);
    };
    if verify_password(&creds.password, &account.password_hash)? {
        Ok(Some(account))
    } else {
        debug!(account_id = %account.id, "login wrong password");
        Ok(None)
    }
}

pub async fn log_in(
    accounts: &dyn AccountStore,
    creds: Option<Credentials>,
) -> anyhow::Result<LoginOutcome> {
    let Some(creds) = creds else {
        return Ok(LoginOutcome::Incomplete);
    };
    let outcome = match authenticate(accounts, &creds).await? {
        None => LoginOutcome::InvalidCredentials,
        Some(account) if !account.is_active => LoginOutcome::Disabled,
        Some(account) => {
            accounts.touch_last_login(account.id).await?;
            LoginOutcome::Succeeded(account)
        }
    };
    Ok(outcome)
}

/// Persist a validated registration and give the account its empty profile.
///
/// The two inserts are independent; a failed profile insert leaves the account in place.
pub async fn register(st: &AppState, reg: Registration) -> anyhow::Result<(Account, Profile)> {
    let password_hash = hash_password(&reg.password).context("hash password")?;
    let account = st
        .accounts
        .create(NewAccount {
            username: reg.username,
            password_hash,
            first_name: reg.first_name,
            last_name: reg.last_name,
            email: reg.email,
        })
        .await?;
    let profile = st
        .profiles
        .create(account.id)
        .await
        .with_context(|| format!("create profile for {}", account.id))?;
    info!(account_id = %account.id, username = %account.username, "account registered");
    Ok((account, profile))
}

/// Profile of the account; every registered account has one.
pub async fn profile_of(st: &AppState, account: &Account) -> anyhow::Result<Profile> {
    st.profiles
        .fetch_by_owner(account.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("account {} has no profile", account.id))
}

/// Save both halves of the edit page. The new photo is uploaded before any row
/// changes and removed again if a row update fails.
pub async fn save_edit(
    st: &AppState,
    account: &Account,
    profile: &Profile,
    account_changes: AccountChanges,
    profile_edit: ProfileEdit,
) -> anyhow::Result<(Account, Profile)> {
    let (photo, uploaded) = match profile_edit.photo {
        PhotoAction::Keep => (profile.photo.clone(), None),
        PhotoAction::Clear => (None, None),
        PhotoAction::Replace(valid) => {
            let key = upload_photo(st, &valid).await?;
            (Some(key.clone()), Some(key))
        }
    };

    let changes = ProfileChanges {
        date_of_birth: profile_edit.date_of_birth,
        photo,
    };
    let saved = match st.accounts.update(account.id, &account_changes).await {
        Ok(account) => st
            .profiles
            .update(account.id, &changes)
            .await
            .map(|profile| (account, profile)),
        Err(e) => Err(e),
    };
    let (account, updated) = match saved {
        Ok(saved) => saved,
        Err(e) => {
            if let Some(key) = uploaded.as_deref() {
                if let Err(del) = st.storage.delete_object(key).await {
                    warn!(error = %del, %key, "failed to delete orphaned photo");
                }
            }
            return Err(e);
        }
    };

    if let Some(old) = profile.photo.as_deref() {
        if updated.photo.as_deref() != Some(old) {
            if let Err(e) = st.storage.delete_object(old).await {
                warn!(error = %e, key = %old, "failed to delete replaced photo");
            }
        }
    }

    info!(account_id = %account.id, "profile updated");
    Ok((account, updated))
}

async fn upload_photo(st: &AppState, photo: &ValidPhoto) -> anyhow::Result<String> {
    let key = photo_key(OffsetDateTime::now_utc(), Uuid::new_v4(), photo.extension);
    st.storage
        .put_object(&key, photo.upload.body.clone(), photo.content_type)
        .await
        .with_context(|| StorageError::new("upload", &key))?;
    debug!(%key, file_name = ?photo.upload.file_name, "photo uploaded");
    Ok(key)
}

/// `users/YYYY/MM/DD/<id>.<ext>`, dated by upload day.
pub fn photo_key(now: OffsetDateTime, id: Uuid, extension: &str) -> String {
    format!(
        "users/{:04}/{:02}/{:02}/{}.{}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        id,
        extension
    )
}

/// Presigned link to the profile photo, if there is one and signing works.
pub async fn photo_url(st: &AppState, profile: &Profile) -> Option<String> {
    let key = profile.photo.as_deref()?;
    match st.storage.presign_get(key, PHOTO_URL_TTL).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, %key, "presign photo failed");
            None
        }
    }
}
