use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::forms::{format_date, FormErrors};
use super::repo_types::{Account, Profile};

/// Submitted login form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Submitted registration form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password2: String,
}

/// Account half of the edit page.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AccountEditForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Profile half of the edit page; filled from a multipart body.
#[derive(Debug, Default, Clone)]
pub struct ProfileEditForm {
    pub date_of_birth: String,
    pub photo: Option<PhotoUpload>,
    pub photo_clear: bool,
}

#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: Option<String>,
    pub body: Bytes,
}

/// Account fields safe to hand to a template.
#[derive(Debug, Serialize)]
pub struct PublicAccount {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&Account> for PublicAccount {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id,
            username: a.username.clone(),
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            email: a.email.clone(),
        }
    }
}

/// A form as the template sees it: current values plus field errors.
#[derive(Debug, Serialize)]
pub struct FormView {
    pub data: serde_json::Value,
    pub errors: FormErrors,
}

impl FormView {
    pub fn unbound() -> Self {
        Self {
            data: serde_json::json!({}),
            errors: FormErrors::default(),
        }
    }

    /// Registration values echoed back; passwords are never re-sent.
    pub fn registration(form: &RegistrationForm, errors: FormErrors) -> Self {
        Self {
            data: serde_json::json!({
                "username": form.username,
                "first_name": form.first_name,
                "last_name": form.last_name,
                "email": form.email,
            }),
            errors,
        }
    }

    pub fn account_edit(form: &AccountEditForm, errors: FormErrors) -> Self {
        Self {
            data: serde_json::json!({
                "first_name": form.first_name,
                "last_name": form.last_name,
                "email": form.email,
            }),
            errors,
        }
    }

    pub fn profile(profile: &Profile, photo_url: Option<String>) -> Self {
        let date_of_birth = profile.date_of_birth.map(format_date);
        Self::profile_with(date_of_birth, profile, photo_url, FormErrors::default())
    }

    /// Profile form re-rendered with what the user typed for the date.
    pub fn profile_with(
        date_of_birth: Option<String>,
        profile: &Profile,
        photo_url: Option<String>,
        errors: FormErrors,
    ) -> Self {
        Self {
            data: serde_json::json!({
                "date_of_birth": date_of_birth,
                "photo": profile.photo,
                "photo_url": photo_url,
            }),
            errors,
        }
    }
}

impl From<&Account> for AccountEditForm {
    fn from(a: &Account) -> Self {
        Self {
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            email: a.email.clone(),
        }
    }
}
