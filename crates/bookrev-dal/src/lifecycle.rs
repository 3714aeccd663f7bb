use tracing::debug;

use crate::{
    Pool,
    error::{Error, Result},
    rating,
    review::{self, CreateReview, ReviewWithUser, UpdateReview},
};

/// Review mutations, each one together with update of book rating in single transaction
#[derive(Clone)]
pub struct ReviewLifecycle {
    pool: Pool,
}

impl ReviewLifecycle {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: i64, payload: CreateReview) -> Result<ReviewWithUser> {
        let mut tx = self.pool.begin().await?;
        let id = review::insert(user_id, &payload, &mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("Book"))?;
        rating::apply_insertion(payload.book_id, payload.rating, &mut *tx).await?;
        let created = review::get_with_user(id, &mut *tx).await?;
        tx.commit().await?;
        debug!(
            "User {user_id} reviewed book {} with rating {}",
            payload.book_id, payload.rating
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        review_id: i64,
        user_id: i64,
        payload: UpdateReview,
    ) -> Result<ReviewWithUser> {
        let mut tx = self.pool.begin().await?;
        let current = review::touch(review_id, &mut *tx).await?;
        if current.user_id != user_id {
            // dropped transaction rolls back the touch
            return Err(Error::NotReviewOwner { review_id });
        }
        review::update_fields(review_id, &payload, &mut *tx).await?;
        if let Some(new_rating) = payload.rating {
            rating::apply_rating_change(current.book_id, current.rating, new_rating, &mut *tx)
                .await?;
        }
        let updated = review::get_with_user(review_id, &mut *tx).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete(&self, review_id: i64, user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        match review::delete_owned(review_id, user_id, &mut *tx).await? {
            Some((book_id, removed)) => {
                rating::apply_deletion(book_id, removed, &mut *tx).await?;
                tx.commit().await?;
                debug!("User {user_id} deleted review {review_id} of book {book_id}");
                Ok(())
            }
            None => match review::owner(review_id, &mut *tx).await? {
                Some(_) => Err(Error::NotReviewOwner { review_id }),
                None => Err(Error::not_found("Review")),
            },
        }
    }

    /// Increments helpful count, any user can vote any number of times
    pub async fn mark_helpful(&self, review_id: i64) -> Result<i64> {
        review::increment_helpful(review_id, &self.pool).await
    }
}
