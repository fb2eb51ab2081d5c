use axum::Router;

use crate::state::AppState;

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod password;
pub mod remember;
pub mod service;
pub mod session;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
