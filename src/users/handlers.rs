use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::guard::AuthUser,
    error::AppResult,
    listing::Page,
    state::AppState,
    users::{
        dto::{CreateUserRequest, PublicUser, UpdateUserRequest, UserQuery},
        services::UserService,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(users, payload))]
pub async fn create_user(
    State(users): State<UserService>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let user = users.create(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(users))]
pub async fn list_users(
    State(users): State<UserService>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Page<PublicUser>>> {
    Ok(Json(users.list(query).await?))
}

#[instrument(skip(users))]
pub async fn get_user(
    State(users): State<UserService>,
    Path(id): Path<i64>,
) -> AppResult<Json<PublicUser>> {
    Ok(Json(users.get(id).await?))
}

#[instrument(skip(users, actor, payload))]
pub async fn update_user(
    State(users): State<UserService>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    Ok(Json(users.update(actor.id, id, payload).await?))
}

#[instrument(skip(users, actor))]
pub async fn delete_user(
    State(users): State<UserService>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    users.delete(actor.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
