use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod pg;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::product_routes()
}
