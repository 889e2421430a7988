use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{error, warn};

use super::repo_types::Account;
use super::session::{token_from_headers, SessionKeys};
use crate::error::AppError;
use crate::state::AppState;

pub const LOGIN_URL: &str = "/account/login/";

/// The logged-in, active account behind the request's session.
///
/// Anonymous requests are redirected to the login page with `next` set to the
/// requested path and query.
pub struct AuthUser(pub Account);

pub enum AuthRejection {
    Login(String),
    Failed(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Login(next) => Redirect::to(&login_redirect(&next)).into_response(),
            AuthRejection::Failed(e) => e.into_response(),
        }
    }
}

/// Login URL carrying `next` as an encoded query parameter.
pub fn login_redirect(next: &str) -> String {
    match serde_urlencoded::to_string([("next", next)]) {
        Ok(query) => format!("{}?{}", LOGIN_URL, query),
        Err(e) => {
            warn!(error = %e, %next, "cannot encode next");
            LOGIN_URL.to_string()
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let requested = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path())
            .to_string();
        let to_login = || AuthRejection::Login(requested.clone());

        let token = token_from_headers(&parts.headers).ok_or_else(to_login)?;
        let claims = match SessionKeys::from_ref(state).verify(token) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "invalid or expired session");
                return Err(to_login());
            }
        };

        let account = state
            .accounts
            .find_by_id(claims.sub)
            .await
            .map_err(|e| {
                error!(error = %e, account_id = %claims.sub, "load session account failed");
                AuthRejection::Failed(e.into())
            })?;

        match account {
            Some(account) if account.is_active => Ok(AuthUser(account)),
            _ => {
                warn!(account_id = %claims.sub, "session account missing or inactive");
                Err(to_login())
            }
        }
    }
}
