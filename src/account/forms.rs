//! Validation of the four account forms.
//!
//! Each `clean_*` function takes the submitted form and returns either the
//! cleaned values or the errors keyed by field name. Every text input,
//! passwords included, is trimmed first.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use time::{macros::format_description, Date};

use super::dto::{AccountEditForm, LoginForm, PhotoUpload, ProfileEditForm, RegistrationForm};
use super::repo::AccountStore;
use super::repo_types::AccountChanges;

pub const REQUIRED: &str = "This field is required.";
pub const PASSWORDS_MISMATCH: &str = "Passwords do not match.";
pub const EMAIL_TAKEN: &str = "An account with this email already exists.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const INVALID_DATE: &str = "Enter a valid date.";
pub const INVALID_IMAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const CLEAR_AND_UPLOAD: &str = "Please either submit a file or check the clear checkbox, not both.";

const NAME_MAX: usize = 150;
const EMAIL_MAX: usize = 254;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Field name → messages, in field order of the map.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Registration that passed validation. `password` is still cleartext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub enum PhotoAction {
    Keep,
    Clear,
    Replace(ValidPhoto),
}

#[derive(Debug, Clone)]
pub struct ValidPhoto {
    pub upload: PhotoUpload,
    pub content_type: &'static str,
    pub extension: &'static str,
}

#[derive(Debug, Clone)]
pub struct ProfileEdit {
    pub date_of_birth: Option<Date>,
    pub photo: PhotoAction,
}

pub fn clean_login(form: &LoginForm) -> Result<Credentials, FormErrors> {
    let mut errors = FormErrors::default();
    let username = required(&mut errors, "username", &form.username);
    let password = required(&mut errors, "password", &form.password);
    errors.into_result(Credentials { username, password })
}

/// Checks the registration form, consulting the store for taken usernames and emails.
pub async fn clean_registration(
    form: &RegistrationForm,
    accounts: &dyn AccountStore,
) -> anyhow::Result<Result<Registration, FormErrors>> {
    let mut errors = FormErrors::default();

    let username = required(&mut errors, "username", &form.username);
    if !username.is_empty() {
        if username.chars().count() > NAME_MAX {
            errors.add("username", max_length(NAME_MAX));
        } else if !USERNAME_RE.is_match(&username) {
            errors.add("username", INVALID_USERNAME);
        } else if accounts.username_exists(&username).await? {
            errors.add("username", USERNAME_TAKEN);
        }
    }

    let first_name = name(&mut errors, "first_name", &form.first_name);
    let last_name = name(&mut errors, "last_name", &form.last_name);

    let email = email(&mut errors, &form.email);
    if !email.is_empty() && !errors.has("email") && accounts.email_exists(&email).await? {
        errors.add("email", EMAIL_TAKEN);
    }

    let password = required(&mut errors, "password", &form.password);
    let password2 = required(&mut errors, "password2", &form.password2);
    if !password.is_empty() && !password2.is_empty() && password != password2 {
        errors.add("password2", PASSWORDS_MISMATCH);
    }

    Ok(errors.into_result(Registration {
        username,
        first_name,
        last_name,
        email,
        password,
    }))
}

/// Contact fields of an existing account. Email is not checked for uniqueness here.
pub fn clean_account_edit(form: &AccountEditForm) -> Result<AccountChanges, FormErrors> {
    let mut errors = FormErrors::default();
    let first_name = name(&mut errors, "first_name", &form.first_name);
    let last_name = name(&mut errors, "last_name", &form.last_name);
    let email = email(&mut errors, &form.email);
    errors.into_result(AccountChanges {
        first_name,
        last_name,
        email,
    })
}

pub fn clean_profile_edit(form: &ProfileEditForm) -> Result<ProfileEdit, FormErrors> {
    let mut errors = FormErrors::default();

    let raw_date = form.date_of_birth.trim();
    let date_of_birth = if raw_date.is_empty() {
        None
    } else {
        match parse_date(raw_date) {
            Some(d) => Some(d),
            None => {
                errors.add("date_of_birth", INVALID_DATE);
                None
            }
        }
    };

    let photo = match &form.photo {
        Some(_) if form.photo_clear => {
            errors.add("photo", CLEAR_AND_UPLOAD);
            PhotoAction::Keep
        }
        Some(upload) => match sniff_image(&upload.body) {
            Some((content_type, extension)) => PhotoAction::Replace(ValidPhoto {
                upload: upload.clone(),
                content_type,
                extension,
            }),
            None => {
                errors.add("photo", INVALID_IMAGE);
                PhotoAction::Keep
            }
        },
        None if form.photo_clear => PhotoAction::Clear,
        None => PhotoAction::Keep,
    };

    errors.into_result(ProfileEdit {
        date_of_birth,
        photo,
    })
}

pub fn parse_date(raw: &str) -> Option<Date> {
    let iso = format_description!("[year]-[month]-[day]");
    let us = format_description!("[month]/[day]/[year]");
    Date::parse(raw, &iso)
        .or_else(|_| Date::parse(raw, &us))
        .ok()
}

pub fn format_date(date: Date) -> String {
    let iso = format_description!("[year]-[month]-[day]");
    date.format(&iso).unwrap_or_else(|_| date.to_string())
}

/// Recognised image types by magic number: (content type, extension).
fn sniff_image(body: &[u8]) -> Option<(&'static str, &'static str)> {
    match body {
        [0xFF, 0xD8, 0xFF, ..] => Some(("image/jpeg", "jpg")),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(("image/png", "png")),
        [b'G', b'I', b'F', b'8', ..] => Some(("image/gif", "gif")),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
            Some(("image/webp", "webp"))
        }
        _ => None,
    }
}

fn required(errors: &mut FormErrors, field: &str, value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, REQUIRED);
    }
    value.to_string()
}

fn name(errors: &mut FormErrors, field: &str, value: &str) -> String {
    let value = value.trim();
    if value.chars().count() > NAME_MAX {
        errors.add(field, max_length(NAME_MAX));
    }
    value.to_string()
}

/// Trimmed address with the domain part lower-cased; the local part is kept as typed.
fn email(errors: &mut FormErrors, value: &str) -> String {
    let value = normalize_email(value.trim());
    if value.is_empty() {
        return value;
    }
    if value.chars().count() > EMAIL_MAX {
        errors.add("email", max_length(EMAIL_MAX));
    } else if !EMAIL_RE.is_match(&value) {
        errors.add("email", INVALID_EMAIL);
    }
    value
}

fn normalize_email(value: &str) -> String {
    match value.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => value.to_string(),
    }
}

fn max_length(limit: usize) -> String {
    format!("Ensure this value has at most {} characters.", limit)
}
