//! Maintenance of book aggregate fields `average_rating` and `total_reviews`.
//!
//! Incremental steps are single `UPDATE` statements computing new values from
//! the current row, so they are safe to run concurrently and are meant to be
//! executed in the same transaction as the review change that triggered them.
//! Averages are rounded to 2 decimal places when written and kept within the
//! rating range 0 to 5, so rounding drift never leaves it. Whenever a single
//! review remains, its rating is taken as is.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RatingStats {
    pub average_rating: f64,
    pub total_reviews: i64,
}

/// SQL expression bounding `expr` to the valid range of average rating
macro_rules! bounded {
    ($expr:literal) => {
        concat!("max(0.0, min(5.0, round(", $expr, ", 2)))")
    };
}

fn skipped(book_id: i64, rows_affected: u64, step: &str) {
    if rows_affected == 0 {
        debug!("Book {book_id} not found, skipping rating {step}");
    }
}

pub(crate) async fn apply_insertion<'c, E>(book_id: i64, rating: u8, executor: E) -> Result<()>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let res = sqlx::query(
        concat!(
            "UPDATE book SET average_rating = ",
            bounded!("(average_rating * total_reviews + ?1) / (total_reviews + 1)"),
            ", total_reviews = total_reviews + 1 WHERE id = ?2"
        ),
    )
    .bind(rating as f64)
    .bind(book_id)
    .execute(executor)
    .await?;
    skipped(book_id, res.rows_affected(), "insertion");
    Ok(())
}

pub(crate) async fn apply_rating_change<'c, E>(
    book_id: i64,
    old_rating: u8,
    new_rating: u8,
    executor: E,
) -> Result<()>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    if old_rating == new_rating {
        return Ok(());
    }
    let res = sqlx::query(
        concat!(
            "UPDATE book SET average_rating = CASE WHEN total_reviews = 1 THEN ?2 ELSE ",
            bounded!("(average_rating * total_reviews - ?1 + ?2) / total_reviews"),
            " END WHERE id = ?3 AND total_reviews > 0"
        ),
    )
    .bind(old_rating as f64)
    .bind(new_rating as f64)
    .bind(book_id)
    .execute(executor)
    .await?;
    skipped(book_id, res.rows_affected(), "change");
    Ok(())
}

/// Must run after the review row is deleted, the last remaining rating is read from reviews.
pub(crate) async fn apply_deletion<'c, E>(book_id: i64, removed: u8, executor: E) -> Result<()>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let res = sqlx::query(
        concat!(
            "UPDATE book SET average_rating = CASE \
            WHEN total_reviews > 2 THEN ",
            bounded!("(average_rating * total_reviews - ?1) / (total_reviews - 1)"),
            " WHEN total_reviews = 2 THEN \
                (SELECT coalesce(max(0.0, min(5.0, round(avg(rating), 2))), 0.0) \
                FROM review WHERE book_id = ?2) \
            ELSE 0.0 END, \
            total_reviews = CASE WHEN total_reviews > 1 THEN total_reviews - 1 ELSE 0 END \
            WHERE id = ?2"
        ),
    )
    .bind(removed as f64)
    .bind(book_id)
    .execute(executor)
    .await?;
    skipped(book_id, res.rows_affected(), "deletion");
    Ok(())
}

/// Sets aggregates from the current set of book reviews.
/// Returns `None` if book does not exist.
pub async fn recompute_from_scratch<'c, E>(book_id: i64, executor: E) -> Result<Option<RatingStats>>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let stats = sqlx::query_as::<_, RatingStats>(
        "UPDATE book SET \
        total_reviews = (SELECT count(*) FROM review WHERE book_id = ?1), \
        average_rating = (SELECT coalesce(round(avg(rating), 2), 0.0) FROM review WHERE book_id = ?1) \
        WHERE id = ?1 RETURNING average_rating, total_reviews",
    )
    .bind(book_id)
    .fetch_optional(executor)
    .await?;
    if stats.is_none() {
        debug!("Book {book_id} not found, skipping rating recompute");
    }
    Ok(stats)
}

/// Recomputes aggregates of all books, which stored values disagree with their reviews.
/// Returns ids of corrected books.
pub async fn reconcile_all<'c, E>(executor: E) -> Result<Vec<i64>>
where
    E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    let fixed = sqlx::query_scalar::<_, i64>(
        "WITH actual AS ( \
            SELECT b.id AS book_id, count(r.id) AS total, coalesce(round(avg(r.rating), 2), 0.0) AS average \
            FROM book b LEFT JOIN review r ON r.book_id = b.id GROUP BY b.id \
        ) \
        UPDATE book SET \
            total_reviews = actual.total, \
            average_rating = actual.average \
        FROM actual \
        WHERE book.id = actual.book_id \
            AND (book.total_reviews != actual.total OR abs(book.average_rating - actual.average) > 0.001) \
        RETURNING id",
    )
    .fetch_all(executor)
    .await?;
    if !fixed.is_empty() {
        info!("Reconciled rating of {} books", fixed.len());
    }
    Ok(fixed)
}
