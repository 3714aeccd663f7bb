use crate::{Batch, ChosenRow, ListingParams, error::Error, error::Result};
use garde::Validate;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row};
use tracing::debug;

const VALID_ORDER_FIELDS: &[&str] = &[
    "id",
    "title",
    "author",
    "genre",
    "published_year",
    "average_rating",
    "total_reviews",
    "created",
    "modified",
];

const DEFAULT_ORDER: &str = "created DESC, id DESC";
pub const MAX_SUGGESTIONS: i64 = 6;

/// Average as shown to readers - one decimal place
pub fn display_rating(average_rating: f64) -> String {
    format!("{:.1}", average_rating)
}

fn current_year() -> i32 {
    time::OffsetDateTime::now_utc().year()
}

fn published_not_in_future(value: &Option<i32>, _ctx: &()) -> garde::Result {
    match value {
        Some(year) if *year > current_year() => Err(garde::Error::new(
            "published year cannot be in the future",
        )),
        _ => Ok(()),
    }
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        Err(garde::Error::new("must not be blank"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateBook {
    #[garde(length(chars, min = 1, max = 200), custom(not_blank))]
    pub title: String,
    #[garde(length(chars, min = 1, max = 100), custom(not_blank))]
    pub author: String,
    #[garde(length(chars, min = 1, max = 2000), custom(not_blank))]
    pub description: String,
    #[garde(inner(length(chars, max = 50)))]
    pub genre: Option<String>,
    #[garde(inner(range(min = 1000)), custom(published_not_in_future))]
    pub published_year: Option<i32>,
    #[garde(inner(url, length(max = 1023)))]
    pub cover_image: Option<String>,
    #[garde(skip)]
    #[serde(skip_deserializing)]
    pub created_by: Option<String>,
}

/// Partial update of catalog fields, only present fields are changed
#[derive(Debug, Serialize, Deserialize, Clone, Validate, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateBook {
    #[garde(inner(length(chars, min = 1, max = 200), custom(not_blank)))]
    pub title: Option<String>,
    #[garde(inner(length(chars, min = 1, max = 100), custom(not_blank)))]
    pub author: Option<String>,
    #[garde(inner(length(chars, min = 1, max = 2000), custom(not_blank)))]
    pub description: Option<String>,
    #[garde(inner(length(chars, max = 50)))]
    pub genre: Option<String>,
    #[garde(inner(range(min = 1000)), custom(published_not_in_future))]
    pub published_year: Option<i32>,
    #[garde(inner(url, length(max = 1023)))]
    pub cover_image: Option<String>,
    #[garde(inner(range(min = 0)))]
    pub version: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub genre: Option<String>,
    pub published_year: Option<i32>,
    pub cover_image: Option<String>,
    pub average_rating: f64,
    pub total_reviews: i64,
    /// Average rating rounded for display
    pub rating: String,
    pub version: i64,
    pub created_by: Option<String>,
    pub created: time::PrimitiveDateTime,
    pub modified: time::PrimitiveDateTime,
}

impl sqlx::FromRow<'_, ChosenRow> for Book {
    fn from_row(row: &ChosenRow) -> Result<Self, sqlx::Error> {
        let average_rating: f64 = row.try_get("average_rating")?;
        Ok(Book {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            description: row.try_get("description")?,
            genre: row.try_get("genre")?,
            published_year: row.try_get("published_year")?,
            cover_image: row.try_get("cover_image")?,
            average_rating,
            total_reviews: row.try_get("total_reviews")?,
            rating: display_rating(average_rating),
            version: row.try_get("version")?,
            created_by: row.try_get("created_by")?,
            created: row.try_get("created")?,
            modified: row.try_get("modified")?,
        })
    }
}

/// Listing representation, without description
#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BookShort {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub published_year: Option<i32>,
    pub cover_image: Option<String>,
    pub average_rating: f64,
    pub total_reviews: i64,
    pub rating: String,
    pub created: time::PrimitiveDateTime,
}

impl sqlx::FromRow<'_, ChosenRow> for BookShort {
    fn from_row(row: &ChosenRow) -> Result<Self, sqlx::Error> {
        let average_rating: f64 = row.try_get("average_rating")?;
        Ok(BookShort {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            genre: row.try_get("genre")?,
            published_year: row.try_get("published_year")?,
            cover_image: row.try_get("cover_image")?,
            average_rating,
            total_reviews: row.try_get("total_reviews")?,
            rating: display_rating(average_rating),
            created: row.try_get("created")?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BookSuggestion {
    pub id: i64,
    pub title: String,
    pub author: String,
}

const SELECT_BOOK: &str = "SELECT id, title, author, description, genre, published_year, cover_image, \
average_rating, total_reviews, version, created_by, created, modified FROM book";

const SEARCH_CONDITION: &str =
    "WHERE title LIKE ?1 ESCAPE '\\' OR author LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\'";

pub(crate) async fn get<'c, E>(id: i64, executor: E) -> Result<Book>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let record = sqlx::query_as::<_, Book>(&format!("{SELECT_BOOK} WHERE id = ?"))
        .bind(id)
        .fetch_one(executor)
        .await
        .map_err(Error::missing_as("Book"))?;
    Ok(record)
}

pub(crate) async fn insert<'c, E>(payload: &CreateBook, executor: E) -> Result<i64>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let result = sqlx::query(
        "INSERT INTO book (title, author, description, genre, published_year, cover_image, created_by, version) \
        VALUES (?, ?, ?, ?, ?, ?, ?, 1)",
    )
    .bind(payload.title.trim())
    .bind(payload.author.trim())
    .bind(&payload.description)
    .bind(payload.genre.as_deref().map(str::trim))
    .bind(payload.published_year)
    .bind(&payload.cover_image)
    .bind(&payload.created_by)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Applies catalog field changes, rating fields are never touched here
pub(crate) async fn update_fields<'c, E>(
    id: i64,
    version: i64,
    payload: &UpdateBook,
    executor: E,
) -> Result<bool>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let result = sqlx::query(
        "UPDATE book SET title = coalesce(?, title), author = coalesce(?, author), \
        description = coalesce(?, description), genre = coalesce(?, genre), \
        published_year = coalesce(?, published_year), cover_image = coalesce(?, cover_image), \
        version = ?, modified = CURRENT_TIMESTAMP WHERE id = ? AND version = ?",
    )
    .bind(payload.title.as_deref().map(str::trim))
    .bind(payload.author.as_deref().map(str::trim))
    .bind(&payload.description)
    .bind(payload.genre.as_deref().map(str::trim))
    .bind(payload.published_year)
    .bind(&payload.cover_image)
    .bind(version + 1)
    .bind(id)
    .bind(version)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn set_cover<'c, E>(id: i64, cover_url: &str, executor: E) -> Result<bool>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let result = sqlx::query(
        "UPDATE book SET cover_image = ?, version = version + 1, modified = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(cover_url)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete<'c, E>(id: i64, executor: E) -> Result<bool>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let result = sqlx::query("DELETE FROM book WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub type BookRepository = BookRepositoryImpl<Pool<crate::ChosenDB>>;

/// Read side of the catalog
pub struct BookRepositoryImpl<E> {
    executor: E,
}

impl<'c, E> BookRepositoryImpl<E>
where
    for<'a> &'a E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub async fn get(&self, id: i64) -> Result<Book> {
        get(id, &self.executor).await
    }

    pub async fn count(&self, params: &ListingParams) -> Result<u64> {
        let count: i64 = match params.like_pattern() {
            Some(pattern) => {
                sqlx::query_scalar(&format!("SELECT count(*) FROM book {SEARCH_CONDITION}"))
                    .bind(pattern)
                    .fetch_one(&self.executor)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT count(*) FROM book")
                    .fetch_one(&self.executor)
                    .await?
            }
        };
        Ok(count as u64)
    }

    pub async fn list(&self, params: ListingParams) -> Result<Batch<BookShort>> {
        let order = params.order_clause(VALID_ORDER_FIELDS, DEFAULT_ORDER)?;
        let limit = params.limit.min(crate::MAX_LIMIT as i64);
        let columns = "id, title, author, genre, published_year, cover_image, average_rating, total_reviews, created";
        let rows = match params.like_pattern() {
            Some(pattern) => {
                let sql = format!(
                    "SELECT {columns} FROM book {SEARCH_CONDITION} {order} LIMIT ?2 OFFSET ?3"
                );
                debug!("Searching books: {sql}");
                sqlx::query_as::<_, BookShort>(&sql)
                    .bind(pattern)
                    .bind(limit)
                    .bind(params.offset)
                    .fetch_all(&self.executor)
                    .await?
            }
            None => {
                let sql = format!("SELECT {columns} FROM book {order} LIMIT ? OFFSET ?");
                debug!("Listing books: {sql}");
                sqlx::query_as::<_, BookShort>(&sql)
                    .bind(limit)
                    .bind(params.offset)
                    .fetch_all(&self.executor)
                    .await?
            }
        };
        let total = self.count(&params).await?;
        Ok(Batch {
            offset: params.offset,
            limit: params.limit,
            total,
            rows,
        })
    }

    pub async fn suggest(&self, query: &str) -> Result<Vec<BookSuggestion>> {
        let Some(pattern) = ListingParams::default().with_filter(query).like_pattern() else {
            return Ok(vec![]);
        };
        let records = sqlx::query_as::<_, BookSuggestion>(
            "SELECT id, title, author FROM book \
            WHERE title LIKE ?1 ESCAPE '\\' OR author LIKE ?1 ESCAPE '\\' ORDER BY title LIMIT ?2",
        )
        .bind(pattern)
        .bind(MAX_SUGGESTIONS)
        .fetch_all(&self.executor)
        .await?;
        Ok(records)
    }
}
