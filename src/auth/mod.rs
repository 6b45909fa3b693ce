use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod guard;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod services;
pub mod token_cache;

pub fn public_router() -> Router<AppState> {
    handlers::public_routes()
}

pub fn protected_router() -> Router<AppState> {
    handlers::protected_routes()
}
