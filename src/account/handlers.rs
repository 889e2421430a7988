use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, FromRef, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::{
    account::{
        dto::{
            AccountEditForm, FormView, LoginForm, PhotoUpload, ProfileEditForm, PublicAccount,
            RegistrationForm,
        },
        extractors::AuthUser,
        forms::{clean_account_edit, clean_login, clean_profile_edit, clean_registration},
        services::{self, LoginOutcome},
        session::SessionKeys,
    },
    error::AppError,
    render::Page,
    state::AppState,
};

pub const LOGIN_SUCCEEDED: &str = "Authentication succeeded.";
pub const LOGIN_DISABLED: &str = "Account disabled.";
pub const LOGIN_INVALID: &str = "Invalid username or password.";
pub const LOGIN_INCOMPLETE: &str = "Fill in all form fields.";
pub const PROFILE_UPDATED: &str = "Profile updated successfully.";
pub const PROFILE_NOT_UPDATED: &str = "Error updating your profile.";

const EDIT_BODY_LIMIT: usize = 5 * 1024 * 1024; // 5MB

pub fn login_routes() -> Router<AppState> {
    Router::new()
        .route("/account/login/", get(login_page).post(login))
        .route("/account/", get(dashboard))
}

pub fn register_routes() -> Router<AppState> {
    Router::new().route("/account/register/", get(register_page).post(register))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/account/edit/", get(edit_page).post(edit))
        .layer(DefaultBodyLimit::max(EDIT_BODY_LIMIT))
}

pub async fn login_page() -> Page {
    Page::new("account/login.html", json!({ "form": FormView::unbound() }))
}

#[instrument(skip(state, form), fields(username = %form.username))]
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let outcome = services::log_in(state.accounts.as_ref(), clean_login(&form).ok()).await?;

    let response = match outcome {
        LoginOutcome::Incomplete => {
            warn!("login form incomplete");
            (StatusCode::BAD_REQUEST, LOGIN_INCOMPLETE).into_response()
        }
        LoginOutcome::InvalidCredentials => {
            warn!("login invalid credentials");
            (StatusCode::UNAUTHORIZED, LOGIN_INVALID).into_response()
        }
        LoginOutcome::Disabled => {
            warn!("login to disabled account");
            (StatusCode::FORBIDDEN, LOGIN_DISABLED).into_response()
        }
        LoginOutcome::Succeeded(account) => {
            let keys = SessionKeys::from_ref(&state);
            let token = keys.sign(account.id).map_err(|e| {
                error!(error = %e, "session sign failed");
                AppError::from(e)
            })?;
            info!(account_id = %account.id, "user logged in");
            (
                StatusCode::OK,
                [(header::SET_COOKIE, keys.cookie(&token))],
                LOGIN_SUCCEEDED,
            )
                .into_response()
        }
    };
    Ok(response)
}

#[instrument(skip_all, fields(account_id = %account.id))]
pub async fn dashboard(AuthUser(account): AuthUser) -> Page {
    Page::new("account/dashboard.html", json!({ "section": "dashboard" }))
}

pub async fn register_page() -> Page {
    Page::new(
        "account/register.html",
        json!({ "user_form": FormView::unbound() }),
    )
}

#[instrument(skip(state, form), fields(username = %form.username))]
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegistrationForm>,
) -> Result<Page, AppError> {
    let registration = match clean_registration(&form, state.accounts.as_ref()).await? {
        Ok(r) => r,
        Err(errors) => {
            warn!(fields = ?errors, "registration rejected");
            return Ok(Page::new(
                "account/register.html",
                json!({ "user_form": FormView::registration(&form, errors) }),
            )
            .with_status(StatusCode::BAD_REQUEST));
        }
    };

    let (account, _profile) = services::register(&state, registration).await.map_err(|e| {
        error!(error = %e, "registration failed");
        AppError::from(e)
    })?;

    Ok(Page::new(
        "account/register_done.html",
        json!({ "new_user": PublicAccount::from(&account) }),
    )
    .with_status(StatusCode::CREATED))
}

#[instrument(skip_all, fields(account_id = %account.id))]
pub async fn edit_page(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
) -> Result<Page, AppError> {
    let profile = services::profile_of(&state, &account).await?;
    let photo_url = services::photo_url(&state, &profile).await;
    Ok(edit_view(
        FormView::account_edit(&AccountEditForm::from(&account), Default::default()),
        FormView::profile(&profile, photo_url),
    ))
}

#[instrument(skip_all, fields(account_id = %account.id))]
pub async fn edit(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    mp: Multipart,
) -> Result<Page, AppError> {
    let profile = services::profile_of(&state, &account).await?;
    let (account_form, profile_form) = read_edit_form(mp).await?;

    let page = match (
        clean_account_edit(&account_form),
        clean_profile_edit(&profile_form),
    ) {
        (Ok(account_changes), Ok(profile_edit)) => {
            let (account, profile) =
                services::save_edit(&state, &account, &profile, account_changes, profile_edit)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "profile update failed");
                        AppError::from(e)
                    })?;
            let photo_url = services::photo_url(&state, &profile).await;
            let mut page = edit_view(
                FormView::account_edit(&AccountEditForm::from(&account), Default::default()),
                FormView::profile(&profile, photo_url),
            );
            page.success(PROFILE_UPDATED);
            page
        }
        (account_result, profile_result) => {
            let account_errors = account_result.err().unwrap_or_default();
            let profile_errors = profile_result.err().unwrap_or_default();
            warn!(account = ?account_errors, profile = ?profile_errors, "profile edit rejected");
            let photo_url = services::photo_url(&state, &profile).await;
            let mut page = edit_view(
                FormView::account_edit(&account_form, account_errors),
                FormView::profile_with(
                    Some(profile_form.date_of_birth.clone()).filter(|d| !d.is_empty()),
                    &profile,
                    photo_url,
                    profile_errors,
                ),
            );
            page.error(PROFILE_NOT_UPDATED);
            page
        }
    };
    Ok(page)
}

fn edit_view(user_form: FormView, profile_form: FormView) -> Page {
    Page::new(
        "account/edit.html",
        json!({ "user_form": user_form, "profile_form": profile_form }),
    )
}

/// Split the edit page's multipart body into its two forms.
///
/// An empty `photo` part (no file chosen) counts as no upload.
async fn read_edit_form(
    mut mp: Multipart,
) -> Result<(AccountEditForm, ProfileEditForm), AppError> {
    let mut account = AccountEditForm::default();
    let mut profile = ProfileEditForm::default();

    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "photo" {
            let file_name = field.file_name().map(str::to_string);
            let body = field.bytes().await.map_err(bad_multipart)?;
            if !body.is_empty() {
                profile.photo = Some(PhotoUpload { file_name, body });
            }
            continue;
        }

        let value = field.text().await.map_err(bad_multipart)?;
        match name.as_str() {
            "first_name" => account.first_name = value,
            "last_name" => account.last_name = value,
            "email" => account.email = value,
            "date_of_birth" => profile.date_of_birth = value,
            "photo-clear" => profile.photo_clear = !value.is_empty(),
            _ => {}
        }
    }
    Ok((account, profile))
}

fn bad_multipart(e: MultipartError) -> AppError {
    AppError::BadRequest(format!("invalid multipart body: {}", e))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{HeaderMap, Request};
    use tower::ServiceExt;

    use super::*;
    use crate::account::forms::{CLEAR_AND_UPLOAD, EMAIL_TAKEN, PASSWORDS_MISMATCH};
    use crate::state::Fakes;

    const BOUNDARY: &str = "XBOUNDARYX";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn app() -> (Router, AppState, Fakes) {
        let (state, fakes) = AppState::fake();
        (crate::app::build_app(state.clone()), state, fakes)
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, headers, bytes.to_vec())
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_multipart(
        uri: &str,
        cookie: &str,
        fields: &[(&str, &str)],
        photo: Option<&[u8]>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = photo {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap()
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn register_alice(router: &Router) -> serde_json::Value {
        let (status, _, body) = send(
            router,
            post_form(
                "/account/register/",
                "username=alice&first_name=Alice&last_name=Liddell&email=a%40example.com&password=Secret1&password2=Secret1",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json(&body)
    }

    async fn login_cookie(router: &Router) -> String {
        let (status, headers, _) = send(
            router,
            post_form("/account/login/", "username=alice&password=Secret1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let set_cookie = headers[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn login_page_renders_empty_form() {
        let (router, _, _) = app();
        let (status, _, body) = send(&router, get("/account/login/", None)).await;
        assert_eq!(status, StatusCode::OK);
        let page = json(&body);
        assert_eq!(page["template"], "account/login.html");
        assert_eq!(page["context"]["form"]["data"], json!({}));
    }

    #[tokio::test]
    async fn login_success_sets_session_cookie() {
        let (router, _, _) = app();
        register_alice(&router).await;

        let (status, headers, body) = send(
            &router,
            post_form("/account/login/", "username=alice&password=Secret1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, LOGIN_SUCCEEDED.as_bytes());
        let cookie = headers[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("sessionid="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (router, _, _) = app();
        register_alice(&router).await;

        let (s1, h1, b1) = send(
            &router,
            post_form("/account/login/", "username=nobody&password=Secret1"),
        )
        .await;
        let (s2, h2, b2) = send(
            &router,
            post_form("/account/login/", "username=alice&password=wrong"),
        )
        .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!((s1, &b1), (s2, &b2));
        assert_eq!(b1, LOGIN_INVALID.as_bytes());
        assert!(!h1.contains_key(header::SET_COOKIE));
        assert!(!h2.contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn login_to_disabled_account_sets_no_session() {
        let (router, _, fakes) = app();
        let done = register_alice(&router).await;
        let id: uuid::Uuid = done["context"]["new_user"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        fakes.accounts.set_active(id, false);

        let (status, headers, body) = send(
            &router,
            post_form("/account/login/", "username=alice&password=Secret1"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, LOGIN_DISABLED.as_bytes());
        assert!(!headers.contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn login_with_missing_field_asks_to_fill_form() {
        let (router, _, _) = app();
        let (status, _, body) =
            send(&router, post_form("/account/login/", "username=alice")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, LOGIN_INCOMPLETE.as_bytes());
    }

    #[tokio::test]
    async fn registration_scenario_rejects_reused_email() {
        let (router, _, fakes) = app();
        let done = register_alice(&router).await;
        assert_eq!(done["template"], "account/register_done.html");
        assert_eq!(done["context"]["new_user"]["username"], "alice");
        let id: uuid::Uuid = done["context"]["new_user"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(fakes.profiles.count_for(id), 1);

        let (status, _, body) = send(
            &router,
            post_form(
                "/account/register/",
                "username=alice2&email=a%40example.com&password=Secret1&password2=Secret1",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let page = json(&body);
        assert_eq!(page["template"], "account/register.html");
        assert_eq!(page["context"]["user_form"]["errors"]["email"][0], EMAIL_TAKEN);
        assert!(page["context"]["user_form"]["data"].get("password").is_none());
        assert_eq!(fakes.accounts.count(), 1);
    }

    #[tokio::test]
    async fn registration_password_mismatch() {
        let (router, _, fakes) = app();
        let (status, _, body) = send(
            &router,
            post_form(
                "/account/register/",
                "username=bob&email=b%40example.com&password=Secret1&password2=Secret2",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let page = json(&body);
        assert_eq!(
            page["context"]["user_form"]["errors"]["password2"][0],
            PASSWORDS_MISMATCH
        );
        assert_eq!(fakes.accounts.count(), 0);
    }

    #[tokio::test]
    async fn guarded_pages_redirect_anonymous_users() {
        let (router, _, _) = app();
        for (uri, next) in [
            ("/account/", "%2Faccount%2F"),
            ("/account/edit/", "%2Faccount%2Fedit%2F"),
            ("/account/?tab=1&x=2", "%2Faccount%2F%3Ftab%3D1%26x%3D2"),
        ] {
            let (status, headers, _) = send(&router, get(uri, None)).await;
            assert_eq!(status, StatusCode::SEE_OTHER);
            assert_eq!(
                headers[header::LOCATION],
                format!("/account/login/?next={}", next).as_str()
            );
        }

        let (status, _, _) = send(&router, get("/account/", Some("sessionid=garbage"))).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn dashboard_for_logged_in_user() {
        let (router, _, _) = app();
        register_alice(&router).await;
        let cookie = login_cookie(&router).await;

        let (status, _, body) = send(&router, get("/account/", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        let page = json(&body);
        assert_eq!(page["template"], "account/dashboard.html");
        assert_eq!(page["context"]["section"], "dashboard");
    }

    #[tokio::test]
    async fn session_of_deactivated_account_is_refused() {
        let (router, _, fakes) = app();
        let done = register_alice(&router).await;
        let cookie = login_cookie(&router).await;
        let id: uuid::Uuid = done["context"]["new_user"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        fakes.accounts.set_active(id, false);

        let (status, _, _) = send(&router, get("/account/", Some(&cookie))).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn edit_page_is_prefilled() {
        let (router, _, _) = app();
        register_alice(&router).await;
        let cookie = login_cookie(&router).await;

        let (status, _, body) = send(&router, get("/account/edit/", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        let page = json(&body);
        assert_eq!(page["template"], "account/edit.html");
        assert_eq!(page["context"]["user_form"]["data"]["first_name"], "Alice");
        assert_eq!(page["context"]["user_form"]["data"]["email"], "a@example.com");
        assert!(page["context"]["profile_form"]["data"]["date_of_birth"].is_null());
        assert!(page["context"]["profile_form"]["data"]["photo"].is_null());
    }

    #[tokio::test]
    async fn edit_saves_both_forms_and_photo() {
        let (router, state, fakes) = app();
        let done = register_alice(&router).await;
        let cookie = login_cookie(&router).await;

        let (status, _, body) = send(
            &router,
            post_multipart(
                "/account/edit/",
                &cookie,
                &[
                    ("first_name", "Al"),
                    ("last_name", "Liddell"),
                    ("email", "al@example.com"),
                    ("date_of_birth", "1990-04-15"),
                ],
                Some(PNG),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page = json(&body);
        assert_eq!(page["messages"][0]["level"], "success");
        assert_eq!(page["messages"][0]["text"], PROFILE_UPDATED);
        assert_eq!(page["context"]["profile_form"]["data"]["date_of_birth"], "1990-04-15");

        let id: uuid::Uuid = done["context"]["new_user"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let account = state.accounts.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(account.first_name, "Al");
        assert_eq!(account.email, "al@example.com");
        let profile = state.profiles.fetch_by_owner(id).await.unwrap().unwrap();
        let key = profile.photo.unwrap();
        assert!(key.starts_with("users/") && key.ends_with(".png"));
        assert!(fakes.storage.contains(&key));
        assert_eq!(
            page["context"]["profile_form"]["data"]["photo_url"],
            format!("https://fake.local/{}", key).as_str()
        );
    }

    #[tokio::test]
    async fn edit_with_invalid_field_saves_nothing() {
        let (router, state, fakes) = app();
        let done = register_alice(&router).await;
        let cookie = login_cookie(&router).await;

        let (status, _, body) = send(
            &router,
            post_multipart(
                "/account/edit/",
                &cookie,
                &[
                    ("first_name", "Changed"),
                    ("email", "al@example.com"),
                    ("date_of_birth", "not a date"),
                ],
                Some(PNG),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page = json(&body);
        assert_eq!(page["messages"].as_array().unwrap().len(), 1);
        assert_eq!(page["messages"][0]["level"], "error");
        assert_eq!(page["messages"][0]["text"], PROFILE_NOT_UPDATED);
        assert_eq!(page["context"]["user_form"]["data"]["first_name"], "Changed");
        assert!(page["context"]["profile_form"]["errors"]["date_of_birth"].is_array());

        let id: uuid::Uuid = done["context"]["new_user"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let account = state.accounts.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(account.first_name, "Alice");
        let profile = state.profiles.fetch_by_owner(id).await.unwrap().unwrap();
        assert_eq!(profile.date_of_birth, None);
        assert_eq!(fakes.storage.len(), 0);
    }

    #[tokio::test]
    async fn edit_with_photo_and_clear_is_rejected() {
        let (router, _, fakes) = app();
        register_alice(&router).await;
        let cookie = login_cookie(&router).await;

        let (status, _, body) = send(
            &router,
            post_multipart(
                "/account/edit/",
                &cookie,
                &[("email", "a@example.com"), ("photo-clear", "on")],
                Some(PNG),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page = json(&body);
        assert_eq!(page["messages"][0]["text"], PROFILE_NOT_UPDATED);
        assert_eq!(
            page["context"]["profile_form"]["errors"]["photo"][0],
            CLEAR_AND_UPLOAD
        );
        assert_eq!(fakes.storage.len(), 0);
    }

    #[tokio::test]
    async fn edit_reports_unavailable_storage() {
        let (router, _, fakes) = app();
        register_alice(&router).await;
        let cookie = login_cookie(&router).await;
        fakes.storage.go_down();

        let (status, _, body) = send(
            &router,
            post_multipart("/account/edit/", &cookie, &[("email", "a@example.com")], Some(PNG)),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(&body)["code"], "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn edit_can_clear_photo() {
        let (router, state, fakes) = app();
        let done = register_alice(&router).await;
        let cookie = login_cookie(&router).await;
        let fields = [("first_name", "Alice"), ("email", "a@example.com")];

        send(&router, post_multipart("/account/edit/", &cookie, &fields, Some(PNG))).await;
        assert_eq!(fakes.storage.len(), 1);

        let mut clearing = fields.to_vec();
        clearing.push(("photo-clear", "on"));
        let (status, _, _) =
            send(&router, post_multipart("/account/edit/", &cookie, &clearing, None)).await;
        assert_eq!(status, StatusCode::OK);

        let id: uuid::Uuid = done["context"]["new_user"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let profile = state.profiles.fetch_by_owner(id).await.unwrap().unwrap();
        assert_eq!(profile.photo, None);
        assert_eq!(fakes.storage.len(), 0);
    }
}
