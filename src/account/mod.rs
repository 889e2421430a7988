use crate::state::AppState;
use axum::Router;

mod dto;
pub(crate) mod extractors;
pub mod forms;
pub mod handlers;
mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
mod session;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::login_routes())
        .merge(handlers::register_routes())
        .merge(handlers::profile_routes())
}
