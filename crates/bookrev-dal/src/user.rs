use bookrev_types::{claim::Role, general::ValidEmail};
use futures::{StreamExt as _, TryStreamExt as _};
use garde::Validate;
use serde::{Deserialize, Serialize};
use sqlx::Pool;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct CreateUser {
    #[garde(dive)]
    pub email: ValidEmail,
    #[garde(length(chars, min = 1, max = 100))]
    pub name: String,
    #[garde(inner(url, length(max = 1023)))]
    pub avatar: Option<String>,
    #[garde(skip)]
    pub role: Role,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserInt {
    id: i64,
    name: String,
    email: String,
    avatar: Option<String>,
    role: String,
    created: time::PrimitiveDateTime,
}

/// Mirror of a user record owned by the identity provider
#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub role: Role,
    pub created: time::PrimitiveDateTime,
}

/// Display fields attached to reviews
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserShort {
    pub id: i64,
    pub name: String,
    pub avatar: Option<String>,
}

impl From<UserInt> for User {
    fn from(value: UserInt) -> Self {
        let role = value.role.parse().unwrap_or_else(|e| {
            warn!("User {} has invalid role: {e}", value.id);
            Role::User
        });
        Self {
            id: value.id,
            name: value.name,
            email: value.email,
            avatar: value.avatar,
            role,
            created: value.created,
        }
    }
}

pub type UserRepository = UserRepositoryImpl<Pool<crate::ChosenDB>>;

pub struct UserRepositoryImpl<E> {
    executor: E,
}

impl<'c, E> UserRepositoryImpl<E>
where
    for<'a> &'a E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub async fn create(&self, payload: CreateUser) -> Result<User> {
        let result =
            sqlx::query("INSERT INTO users (name, email, avatar, role) VALUES (?, ?, ?, ?)")
                .bind(&payload.name)
                .bind(payload.email.as_ref())
                .bind(&payload.avatar)
                .bind(payload.role.as_str())
                .execute(&self.executor)
                .await?;

        let id = result.last_insert_rowid();
        self.get(id).await
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, UserInt>(
            "SELECT id, name, email, avatar, role, created FROM users ORDER BY id",
        )
        .fetch(&self.executor)
        .take(limit)
        .map_ok(User::from)
        .try_collect::<Vec<_>>()
        .await?;
        Ok(users)
    }

    pub async fn get(&self, id: i64) -> Result<User> {
        let user: User = sqlx::query_as::<_, UserInt>(
            "SELECT id, name, email, avatar, role, created FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.executor)
        .await
        .map_err(Error::missing_as("User"))?
        .into();
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User> {
        let user: User = sqlx::query_as::<_, UserInt>(
            "SELECT id, name, email, avatar, role, created FROM users WHERE email = ?",
        )
        .bind(email.to_lowercase())
        .fetch_one(&self.executor)
        .await
        .map_err(Error::missing_as("User"))?
        .into();
        Ok(user)
    }
}
