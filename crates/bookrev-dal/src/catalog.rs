use bookrev_types::claim::Authorization;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    ListingParams, Pool,
    book::{self, Book, CreateBook, UpdateBook},
    error::{Error, Result},
    rating::{self, RatingStats},
    review::{self, ReviewRepository, ReviewWithUser},
};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BookDetail {
    pub book: Book,
    pub reviews: Vec<ReviewWithUser>,
}

fn require_admin(actor: &impl Authorization) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::AdminRequired)
    }
}

/// Catalog management, all changes are restricted to admins
#[derive(Clone)]
pub struct Catalog {
    pool: Pool,
}

impl Catalog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, actor: &impl Authorization, payload: CreateBook) -> Result<Book> {
        require_admin(actor)?;
        let mut tx = self.pool.begin().await?;
        let id = book::insert(&payload, &mut *tx).await?;
        let created = book::get(id, &mut *tx).await?;
        tx.commit().await?;
        info!("Created book {id}: {}", created.title);
        Ok(created)
    }

    pub async fn update(
        &self,
        actor: &impl Authorization,
        id: i64,
        payload: UpdateBook,
    ) -> Result<Book> {
        require_admin(actor)?;
        let version = payload.version.ok_or(Error::MissingVersion)?;
        let mut tx = self.pool.begin().await?;
        if !book::update_fields(id, version, &payload, &mut *tx).await? {
            // either missing or stale version
            book::get(id, &mut *tx).await?;
            return Err(Error::FailedUpdate { id, version });
        }
        let updated = book::get(id, &mut *tx).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Deletes book together with all its reviews
    pub async fn delete(&self, actor: &impl Authorization, id: i64) -> Result<()> {
        require_admin(actor)?;
        let mut tx = self.pool.begin().await?;
        let removed_reviews = review::delete_for_book(id, &mut *tx).await?;
        if !book::delete(id, &mut *tx).await? {
            return Err(Error::not_found("Book"));
        }
        tx.commit().await?;
        info!("Deleted book {id} with {removed_reviews} reviews");
        Ok(())
    }

    pub async fn set_cover(
        &self,
        actor: &impl Authorization,
        id: i64,
        cover_url: &str,
    ) -> Result<Book> {
        require_admin(actor)?;
        let mut tx = self.pool.begin().await?;
        if !book::set_cover(id, cover_url, &mut *tx).await? {
            return Err(Error::not_found("Book"));
        }
        let updated = book::get(id, &mut *tx).await?;
        tx.commit().await?;
        debug!("Cover of book {id} set to {cover_url}");
        Ok(updated)
    }

    pub async fn recompute_rating(
        &self,
        actor: &impl Authorization,
        id: i64,
    ) -> Result<RatingStats> {
        require_admin(actor)?;
        rating::recompute_from_scratch(id, &self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Book"))
    }

    /// Book with its reviews, newest first
    pub async fn get_with_reviews(&self, id: i64) -> Result<BookDetail> {
        let book = book::get(id, &self.pool).await?;
        let reviews = ReviewRepository::new(self.pool.clone())
            .list_for_book(id, ListingParams::default())
            .await?
            .rows;
        Ok(BookDetail { book, reviews })
    }
}
