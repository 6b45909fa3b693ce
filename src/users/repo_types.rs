use sqlx::FromRow;
use time::OffsetDateTime;

use crate::listing::{contains_ci, Status};

/// User record as stored. Never serialized directly; see `PublicUser`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub password_hash: String, // Argon2 PHC string
    pub status: Status,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub status: Status,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub username: Option<String>,
    pub email: Option<String>,
    pub status: Option<Status>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        contains_ci(&user.username, self.username.as_deref())
            && contains_ci(&user.email, self.email.as_deref())
            && self.status.map_or(true, |s| s == user.status)
    }
}
