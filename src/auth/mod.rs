use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod mailer;
pub mod password;
pub mod random;
pub mod reset;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
