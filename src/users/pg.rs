use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::listing::{like_pattern, PageRequest};
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, User, UserChanges, UserFilter};

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Maps a unique-constraint violation to a conflict on the offending column.
fn conflict_or_db(err: sqlx::Error, username: Option<&str>, email: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let on_email = db_err.constraint().is_some_and(|c| c.contains("email"));
            let (field, value) = if on_email {
                ("email", email)
            } else {
                ("username", username)
            };
            return StoreError::Conflict {
                field,
                value: value.unwrap_or_default().to_string(),
            };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, name, password_hash, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, email, name, password_hash, status, created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.status)
        .fetch_one(&self.db)
        .await
        .map_err(|e| conflict_or_db(e, Some(&user.username), Some(&user.email)))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, name, password_hash, status, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, name, password_hash, status, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, u64), StoreError> {
        let username = filter.username.as_deref().map(like_pattern);
        let email = filter.email.as_deref().map(like_pattern);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE ($1::text IS NULL OR username ILIKE $1)
              AND ($2::text IS NULL OR email ILIKE $2)
              AND ($3::record_status IS NULL OR status = $3)
            "#,
        )
        .bind(&username)
        .bind(&email)
        .bind(filter.status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, name, password_hash, status, created_at, updated_at
            FROM users
            WHERE ($1::text IS NULL OR username ILIKE $1)
              AND ($2::text IS NULL OR email ILIKE $2)
              AND ($3::record_status IS NULL OR status = $3)
            ORDER BY id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&username)
        .bind(&email)
        .bind(filter.status)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.db)
        .await?;

        Ok((rows, total.max(0) as u64))
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                name = COALESCE($4, name),
                password_hash = COALESCE($5, password_hash),
                status = COALESCE($6, status),
                updated_at = now()
            WHERE id = $1
            RETURNING id, username, email, name, password_hash, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.name)
        .bind(&changes.password_hash)
        .bind(changes.status)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| conflict_or_db(e, changes.username.as_deref(), changes.email.as_deref()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
