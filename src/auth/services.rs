use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{debug, info, warn};

use crate::auth::dto::{AuthResponse, LoginRequest, MessageResponse, RegisterRequest, TokenResponse};
use crate::auth::guard::CurrentUser;
use crate::auth::jwt::{JwtKeys, TokenSubject};
use crate::auth::password::{burn_verification, verify_password};
use crate::auth::token_cache::TokenCache;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::users::repo::UserStore;
use crate::users::services::prepare_new_user;

pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

fn invalid_credentials() -> AppError {
    AppError::unauthorized(INVALID_CREDENTIALS)
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: Arc<JwtKeys>,
    token_cache: Option<Arc<TokenCache>>,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), state.keys.clone(), state.token_cache.clone())
    }
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        keys: Arc<JwtKeys>,
        token_cache: Option<Arc<TokenCache>>,
    ) -> Self {
        Self {
            users,
            keys,
            token_cache,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> AppResult<AuthResponse> {
        let new_user = prepare_new_user(&req.username, &req.email, &req.name, &req.password)?;
        let user = self.users.create(new_user).await.map_err(|e| {
            warn!(error = %e, "registration rejected");
            AppError::from(e)
        })?;

        let access_token = self.issue_and_cache(TokenSubject::from(&user))?;
        info!(user_id = user.id, username = %user.username, "user registered");
        Ok(AuthResponse {
            access_token,
            user: user.into(),
        })
    }

    /// Unknown user, wrong password and inactive account all yield the same error.
    pub async fn login(&self, req: LoginRequest) -> AppResult<AuthResponse> {
        let username = req.username.trim();
        let Some(user) = self.users.find_by_username(username).await? else {
            burn_verification(&req.password);
            warn!(username = %username, "login unknown username");
            return Err(invalid_credentials());
        };

        if !verify_password(&req.password, &user.password_hash)? {
            warn!(user_id = user.id, "login invalid password");
            return Err(invalid_credentials());
        }
        if !user.is_active() {
            warn!(user_id = user.id, "login inactive account");
            return Err(invalid_credentials());
        }

        let cached = self
            .token_cache
            .as_ref()
            .and_then(|cache| cache.get(user.id, &user.username));
        let access_token = match cached {
            Some(issued) => issued.token,
            None => self.issue_and_cache(TokenSubject::from(&user))?,
        };

        info!(user_id = user.id, "user logged in");
        Ok(AuthResponse {
            access_token,
            user: user.into(),
        })
    }

    /// Always signs a new token and replaces any cached one.
    pub fn refresh(&self, current: &CurrentUser) -> AppResult<TokenResponse> {
        let access_token = self.issue_and_cache(TokenSubject::from(current))?;
        debug!(user_id = current.id, "token refreshed");
        Ok(TokenResponse { access_token })
    }

    pub fn logout(&self, current: &CurrentUser) -> MessageResponse {
        if let Some(cache) = &self.token_cache {
            cache.evict_user(current.id);
        }
        info!(user_id = current.id, "user logged out");
        MessageResponse {
            message: "Logged out".to_string(),
        }
    }

    fn issue_and_cache(&self, subject: TokenSubject<'_>) -> AppResult<String> {
        let issued = self.keys.issue(subject)?;
        let token = issued.token.clone();
        if let Some(cache) = &self.token_cache {
            cache.put(subject.id, subject.username, issued);
        }
        Ok(token)
    }
}
