pub mod book;
pub mod catalog;
pub mod error;
pub mod lifecycle;
pub mod rating;
pub mod review;
pub mod user;

use std::{fmt::Display, str::FromStr, time::Duration};

pub use error::Error;
pub use sqlx::Error as SqlxError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::Result;

pub type ChosenDB = sqlx::Sqlite;
pub type ChosenRow = sqlx::sqlite::SqliteRow;
pub type Pool = sqlx::Pool<ChosenDB>;

pub const MAX_LIMIT: usize = 10_000;
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn new_pool(database_url: &str) -> Result<Pool, Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .max_connections(50)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &Pool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub enum Order {
    Asc(String),
    Desc(String),
}

impl Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Order::Asc(s) => write!(f, "{}", s),
            Order::Desc(s) => write!(f, "{} DESC", s),
        }
    }
}

impl AsRef<str> for Order {
    fn as_ref(&self) -> &str {
        match self {
            Order::Asc(s) => s.as_str(),
            Order::Desc(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListingParams {
    pub offset: i64,
    pub limit: i64,
    pub order: Option<Vec<Order>>,
    /// Case insensitive substring search, meaning depends on listed entity
    pub filter: Option<String>,
}

impl Default for ListingParams {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: MAX_LIMIT as i64,
            order: None,
            filter: None,
        }
    }
}

impl ListingParams {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            offset,
            limit,
            order: None,
            filter: None,
        }
    }

    pub fn with_order(mut self, order: Vec<Order>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn ordering(&self, valid_fields: &[&str]) -> Result<String> {
        let ordering = self
            .order
            .as_ref()
            .map(|o| {
                o.iter()
                    .map(|o| {
                        if valid_fields.contains(&o.as_ref()) {
                            Ok(o.to_string())
                        } else {
                            Err(Error::InvalidOrderByField(o.as_ref().to_string()))
                        }
                    })
                    .collect::<Result<Vec<String>>>()
                    .map(|o| o.join(", "))
            })
            .transpose()?
            .unwrap_or_default();
        Ok(ordering)
    }

    /// Complete `ORDER BY` clause, `default` is used when no ordering was requested
    pub(crate) fn order_clause(&self, valid_fields: &[&str], default: &str) -> Result<String> {
        let ordering = self.ordering(valid_fields)?;
        if ordering.is_empty() {
            Ok(format!("ORDER BY {default}"))
        } else {
            Ok(format!("ORDER BY {ordering}"))
        }
    }

    /// `LIKE` pattern for the filter, with wildcards in the filter escaped by `\`
    pub(crate) fn like_pattern(&self) -> Option<String> {
        self.filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| {
                let escaped = f
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!("%{escaped}%")
            })
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Batch<T> {
    pub offset: i64,
    pub limit: i64,
    pub total: u64,
    pub rows: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let params = ListingParams::default()
            .with_order(vec![Order::Desc("created".into()), Order::Asc("title".into())]);
        assert_eq!(
            params.order_clause(&["created", "title"], "id").unwrap(),
            "ORDER BY created DESC, title"
        );
        assert!(matches!(
            params.ordering(&["created"]),
            Err(Error::InvalidOrderByField(f)) if f == "title"
        ));
        assert_eq!(
            ListingParams::default().order_clause(&[], "created DESC").unwrap(),
            "ORDER BY created DESC"
        );
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(ListingParams::default().like_pattern(), None);
        assert_eq!(
            ListingParams::default().with_filter("   ").like_pattern(),
            None
        );
        assert_eq!(
            ListingParams::default()
                .with_filter(" 100%_sure ")
                .like_pattern()
                .unwrap(),
            "%100\\%\\_sure%"
        );
    }
}
