use std::sync::Arc;

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::password::hash_password;
use crate::auth::token_cache::TokenCache;
use crate::error::{AppError, AppResult};
use crate::listing::{Page, PageRequest, Status};
use crate::state::AppState;
use crate::users::dto::{CreateUserRequest, PublicUser, UpdateUserRequest, UserQuery};
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, UserChanges, UserFilter};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_USERNAME_LEN: usize = 64;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_username(raw: &str) -> AppResult<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("Username must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::bad_request(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(username.to_string())
}

pub(crate) fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::bad_request("Invalid email"));
    }
    Ok(email)
}

pub(crate) fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Validates account fields and hashes the password. Shared by registration and admin creation.
pub(crate) fn prepare_new_user(
    username: &str,
    email: &str,
    name: &str,
    password: &str,
) -> AppResult<NewUser> {
    let username = normalize_username(username)?;
    let email = normalize_email(email)?;
    check_password(password)?;
    Ok(NewUser {
        username,
        email,
        name: name.trim().to_string(),
        password_hash: hash_password(password)?,
        status: Status::Active,
    })
}

pub(crate) fn user_not_found(id: i64) -> AppError {
    AppError::not_found(format!("User {id} not found"))
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    token_cache: Option<Arc<TokenCache>>,
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), state.token_cache.clone())
    }
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, token_cache: Option<Arc<TokenCache>>) -> Self {
        Self { users, token_cache }
    }

    pub async fn create(&self, req: CreateUserRequest) -> AppResult<PublicUser> {
        let new_user = prepare_new_user(&req.username, &req.email, &req.name, &req.password)?;
        let user = self.users.create(new_user).await?;
        info!(user_id = user.id, username = %user.username, "user created");
        Ok(user.into())
    }

    pub async fn list(&self, query: UserQuery) -> AppResult<Page<PublicUser>> {
        let page = PageRequest::new(query.page, query.limit)?;
        let filter = UserFilter {
            username: query.username,
            email: query.email,
            status: query.status,
        };
        let (rows, total) = self.users.list(&filter, page).await?;
        Ok(Page::new(rows, total, page).map(PublicUser::from))
    }

    pub async fn get(&self, id: i64) -> AppResult<PublicUser> {
        self.users
            .find_by_id(id)
            .await?
            .map(PublicUser::from)
            .ok_or_else(|| user_not_found(id))
    }

    /// `actor_id` is the authenticated caller; callers may not deactivate themselves.
    pub async fn update(
        &self,
        actor_id: i64,
        id: i64,
        req: UpdateUserRequest,
    ) -> AppResult<PublicUser> {
        if actor_id == id && req.status == Some(Status::Inactive) {
            return Err(AppError::forbidden("Cannot deactivate your own account"));
        }

        let mut changes = UserChanges {
            name: req.name.map(|n| n.trim().to_string()),
            status: req.status,
            ..Default::default()
        };
        if let Some(username) = req.username.as_deref() {
            changes.username = Some(normalize_username(username)?);
        }
        if let Some(email) = req.email.as_deref() {
            changes.email = Some(normalize_email(email)?);
        }
        if let Some(password) = req.password.as_deref() {
            check_password(password)?;
            changes.password_hash = Some(hash_password(password)?);
        }

        let user = self
            .users
            .update(id, changes)
            .await?
            .ok_or_else(|| user_not_found(id))?;
        self.forget_tokens(id);
        info!(user_id = id, actor_id, "user updated");
        Ok(user.into())
    }

    pub async fn delete(&self, actor_id: i64, id: i64) -> AppResult<()> {
        if actor_id == id {
            return Err(AppError::forbidden("Cannot delete your own account"));
        }
        if !self.users.delete(id).await? {
            return Err(user_not_found(id));
        }
        self.forget_tokens(id);
        info!(user_id = id, actor_id, "user deleted");
        Ok(())
    }

    fn forget_tokens(&self, user_id: i64) {
        if let Some(cache) = &self.token_cache {
            cache.evict_user(user_id);
        }
    }
}
