use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::listing::PageRequest;
use crate::users::repo_types::{NewUser, User, UserChanges, UserFilter};

/// Credential store. Implementations must enforce username/email uniqueness atomically.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Returns the requested page ordered by id, plus the total number of matches.
    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, u64), StoreError>;

    /// Returns `None` when no user has this id.
    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError>;

    /// Returns `false` when no user has this id.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}

#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<UserRows>,
}

#[derive(Default)]
struct UserRows {
    last_id: i64,
    rows: BTreeMap<i64, User>,
}

impl UserRows {
    fn ensure_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except: Option<i64>,
    ) -> Result<(), StoreError> {
        for user in self.rows.values().filter(|u| Some(u.id) != except) {
            if let Some(username) = username.filter(|n| *n == user.username) {
                return Err(StoreError::Conflict {
                    field: "username",
                    value: username.to_string(),
                });
            }
            if let Some(email) = email.filter(|e| *e == user.email) {
                return Err(StoreError::Conflict {
                    field: "email",
                    value: email.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write();
        inner.ensure_unique(Some(&user.username), Some(&user.email), None)?;

        inner.last_id += 1;
        let now = OffsetDateTime::now_utc();
        let record = User {
            id: inner.last_id,
            username: user.username,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            status: user.status,
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().rows.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .inner
            .read()
            .rows
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, u64), StoreError> {
        let inner = self.inner.read();
        let matching: Vec<&User> = inner.rows.values().filter(|u| filter.matches(u)).collect();
        let total = matching.len() as u64;
        let data = page.slice(matching).into_iter().cloned().collect();
        Ok((data, total))
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write();
        if !inner.rows.contains_key(&id) {
            return Ok(None);
        }
        inner.ensure_unique(changes.username.as_deref(), changes.email.as_deref(), Some(id))?;

        let Some(user) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(password_hash) = changes.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(status) = changes.status {
            user.status = status;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().rows.remove(&id).is_some())
    }
}
