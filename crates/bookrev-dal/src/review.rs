use crate::{
    Batch, ChosenRow, ListingParams,
    error::{Error, Result},
    user::UserShort,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow as _, Pool, Row};

const VALID_ORDER_FIELDS: &[&str] = &["created", "modified", "rating", "helpful"];
const DEFAULT_ORDER: &str = "created DESC, id DESC";

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        Err(garde::Error::new("must not be blank"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateReview {
    #[garde(skip)]
    pub book_id: i64,
    #[garde(range(min = 1, max = 5))]
    pub rating: u8,
    #[garde(length(chars, min = 1, max = 1000), custom(not_blank))]
    pub comment: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateReview {
    #[garde(inner(range(min = 1, max = 5)))]
    pub rating: Option<u8>,
    #[garde(inner(length(chars, min = 1, max = 1000), custom(not_blank)))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Review {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub rating: u8,
    pub comment: String,
    pub helpful: i64,
    pub created: time::PrimitiveDateTime,
    pub modified: time::PrimitiveDateTime,
}

/// Review with display fields of its author
#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReviewWithUser {
    #[serde(flatten)]
    pub review: Review,
    pub user: UserShort,
}

impl sqlx::FromRow<'_, ChosenRow> for ReviewWithUser {
    fn from_row(row: &ChosenRow) -> Result<Self, sqlx::Error> {
        let review = Review::from_row(row)?;
        let user = UserShort {
            id: review.user_id,
            name: row.try_get("user_name")?,
            avatar: row.try_get("user_avatar")?,
        };
        Ok(ReviewWithUser { review, user })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BookRef {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub cover_image: Option<String>,
}

/// Review with basic info about the reviewed book
#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReviewWithBook {
    #[serde(flatten)]
    pub review: Review,
    pub book: BookRef,
}

impl sqlx::FromRow<'_, ChosenRow> for ReviewWithBook {
    fn from_row(row: &ChosenRow) -> Result<Self, sqlx::Error> {
        let review = Review::from_row(row)?;
        let book = BookRef {
            id: review.book_id,
            title: row.try_get("book_title")?,
            author: row.try_get("book_author")?,
            cover_image: row.try_get("book_cover_image")?,
        };
        Ok(ReviewWithBook { review, book })
    }
}

const REVIEW_COLUMNS: &str =
    "r.id, r.book_id, r.user_id, r.rating, r.comment, r.helpful, r.created, r.modified";

fn select_with_user() -> String {
    format!(
        "SELECT {REVIEW_COLUMNS}, u.name AS user_name, u.avatar AS user_avatar \
        FROM review r JOIN users u ON u.id = r.user_id"
    )
}

fn select_with_book() -> String {
    format!(
        "SELECT {REVIEW_COLUMNS}, b.title AS book_title, b.author AS book_author, \
        b.cover_image AS book_cover_image FROM review r JOIN book b ON b.id = r.book_id"
    )
}

fn qualified_order(params: &ListingParams) -> Result<String> {
    let order = params.order_clause(VALID_ORDER_FIELDS, DEFAULT_ORDER)?;
    // all sortable fields live on review, qualify them to avoid ambiguity in joins
    let qualified = order
        .trim_start_matches("ORDER BY ")
        .split(", ")
        .map(|part| format!("r.{part}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("ORDER BY {qualified}"))
}

/// Inserts review, statement succeeds only if the book exists.
/// Returns `None` when the book is missing.
pub(crate) async fn insert<'c, E>(
    user_id: i64,
    payload: &CreateReview,
    executor: E,
) -> Result<Option<i64>>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let res = sqlx::query_scalar::<_, i64>(
        "INSERT INTO review (book_id, user_id, rating, comment) \
        SELECT id, ?, ?, ? FROM book WHERE id = ? RETURNING id",
    )
    .bind(user_id)
    .bind(payload.rating)
    .bind(payload.comment.trim())
    .bind(payload.book_id)
    .fetch_optional(executor)
    .await;

    match res {
        Ok(id) => Ok(id),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(Error::DuplicateReview {
            book_id: payload.book_id,
            user_id,
        }),
        Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
            Err(Error::not_found("User"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Bumps modification time and returns review as it was.
/// Being a write it takes the write lock for rest of the transaction.
pub(crate) async fn touch<'c, E>(id: i64, executor: E) -> Result<Review>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let review = sqlx::query_as::<_, Review>(
        "UPDATE review SET modified = CURRENT_TIMESTAMP WHERE id = ? \
        RETURNING id, book_id, user_id, rating, comment, helpful, created, modified",
    )
    .bind(id)
    .fetch_one(executor)
    .await
    .map_err(Error::missing_as("Review"))?;
    Ok(review)
}

pub(crate) async fn update_fields<'c, E>(id: i64, payload: &UpdateReview, executor: E) -> Result<()>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    sqlx::query(
        "UPDATE review SET rating = coalesce(?, rating), comment = coalesce(?, comment) WHERE id = ?",
    )
    .bind(payload.rating)
    .bind(payload.comment.as_deref().map(str::trim))
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Deletes review only if owned by user, returns `(book_id, rating)` of deleted review
pub(crate) async fn delete_owned<'c, E>(
    id: i64,
    user_id: i64,
    executor: E,
) -> Result<Option<(i64, u8)>>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let deleted = sqlx::query_as::<_, (i64, u8)>(
        "DELETE FROM review WHERE id = ? AND user_id = ? RETURNING book_id, rating",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?;
    Ok(deleted)
}

pub(crate) async fn owner<'c, E>(id: i64, executor: E) -> Result<Option<i64>>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let owner = sqlx::query_scalar::<_, i64>("SELECT user_id FROM review WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(owner)
}

/// Bulk removal of book reviews, aggregates are not touched
pub(crate) async fn delete_for_book<'c, E>(book_id: i64, executor: E) -> Result<u64>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let res = sqlx::query("DELETE FROM review WHERE book_id = ?")
        .bind(book_id)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}

pub(crate) async fn increment_helpful<'c, E>(id: i64, executor: E) -> Result<i64>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let helpful = sqlx::query_scalar::<_, i64>(
        "UPDATE review SET helpful = helpful + 1 WHERE id = ? RETURNING helpful",
    )
    .bind(id)
    .fetch_one(executor)
    .await
    .map_err(Error::missing_as("Review"))?;
    Ok(helpful)
}

pub(crate) async fn get_with_user<'c, E>(id: i64, executor: E) -> Result<ReviewWithUser>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let sql = format!("{} WHERE r.id = ?", select_with_user());
    let review = sqlx::query_as::<_, ReviewWithUser>(&sql)
        .bind(id)
        .fetch_one(executor)
        .await
        .map_err(Error::missing_as("Review"))?;
    Ok(review)
}

pub type ReviewRepository = ReviewRepositoryImpl<Pool<crate::ChosenDB>>;

/// Read side of reviews
pub struct ReviewRepositoryImpl<E> {
    executor: E,
}

impl<'c, E> ReviewRepositoryImpl<E>
where
    for<'a> &'a E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub async fn get(&self, id: i64) -> Result<ReviewWithUser> {
        get_with_user(id, &self.executor).await
    }

    pub async fn list_for_book(
        &self,
        book_id: i64,
        params: ListingParams,
    ) -> Result<Batch<ReviewWithUser>> {
        let sql = format!(
            "{} WHERE r.book_id = ? {} LIMIT ? OFFSET ?",
            select_with_user(),
            qualified_order(&params)?
        );
        let rows = sqlx::query_as::<_, ReviewWithUser>(&sql)
            .bind(book_id)
            .bind(params.limit.min(crate::MAX_LIMIT as i64))
            .bind(params.offset)
            .fetch_all(&self.executor)
            .await?;
        let total = self.count_where("book_id", book_id).await?;
        Ok(Batch {
            offset: params.offset,
            limit: params.limit,
            total,
            rows,
        })
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
        params: ListingParams,
    ) -> Result<Batch<ReviewWithBook>> {
        let sql = format!(
            "{} WHERE r.user_id = ? {} LIMIT ? OFFSET ?",
            select_with_book(),
            qualified_order(&params)?
        );
        let rows = sqlx::query_as::<_, ReviewWithBook>(&sql)
            .bind(user_id)
            .bind(params.limit.min(crate::MAX_LIMIT as i64))
            .bind(params.offset)
            .fetch_all(&self.executor)
            .await?;
        let total = self.count_where("user_id", user_id).await?;
        Ok(Batch {
            offset: params.offset,
            limit: params.limit,
            total,
            rows,
        })
    }

    async fn count_where(&self, column: &'static str, value: i64) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT count(*) FROM review WHERE {column} = ?"))
                .bind(value)
                .fetch_one(&self.executor)
                .await?;
        Ok(count as u64)
    }
}
