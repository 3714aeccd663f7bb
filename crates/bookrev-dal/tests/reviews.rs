use std::collections::HashMap;

use bookrev_dal::{
    Error, ListingParams,
    book::BookRepositoryImpl,
    catalog::Catalog,
    lifecycle::ReviewLifecycle,
    rating,
    review::{CreateReview, ReviewRepositoryImpl, UpdateReview},
};
use bookrev_types::claim::{ApiClaim, Role};
use futures::TryStreamExt as _;
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use sqlx::Executor;

const TEST_DATA: &str = r#"
INSERT INTO users (id, name, email, avatar, role) VALUES (1, 'Admin', 'admin@example.com', NULL, 'admin');
INSERT INTO users (id, name, email, avatar, role) VALUES (2, 'Alice', 'alice@example.com', 'https://example.com/alice.png', 'user');
INSERT INTO users (id, name, email, avatar, role) VALUES (3, 'Bob', 'bob@example.com', NULL, 'user');

INSERT INTO book (id, title, author, description, genre, published_year, created_by)
VALUES (1, 'Dune', 'Frank Herbert', 'Desert planet', 'sci-fi', 1965, '1');
INSERT INTO book (id, title, author, description, genre, published_year, created_by)
VALUES (2, 'Emma', 'Jane Austen', 'Matchmaking', 'classic', 1815, '1');
"#;

async fn init_db() -> sqlx::Pool<sqlx::Sqlite> {
    const DB_URL: &str = "sqlite::memory:";
    let conn = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .connect(DB_URL)
        .await
        .unwrap();
    conn.execute("PRAGMA foreign_keys = ON").await.unwrap();
    bookrev_dal::migrate(&conn).await.unwrap();

    conn.execute_many(TEST_DATA)
        .try_collect::<Vec<_>>()
        .await
        .unwrap();

    conn
}

async fn init_file_db(dir: &tempfile::TempDir) -> sqlx::Pool<sqlx::Sqlite> {
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let pool = bookrev_dal::new_pool(&url).await.unwrap();
    bookrev_dal::migrate(&pool).await.unwrap();
    pool.execute_many(TEST_DATA)
        .try_collect::<Vec<_>>()
        .await
        .unwrap();
    pool
}

async fn add_readers(pool: &sqlx::Pool<sqlx::Sqlite>, ids: std::ops::RangeInclusive<i64>) {
    for id in ids {
        sqlx::query(
            "INSERT INTO users (id, name, email, avatar, role) VALUES (?1, ?2, ?3, NULL, 'user')",
        )
        .bind(id)
        .bind(format!("Reader {id}"))
        .bind(format!("reader{id}@example.com"))
        .execute(pool)
        .await
        .unwrap();
    }
}

async fn count_reviews(pool: &sqlx::Pool<sqlx::Sqlite>, book_id: i64) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM review WHERE book_id = ?")
        .bind(book_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn mean(ratings: impl Iterator<Item = u8>) -> f64 {
    let (sum, count) = ratings.fold((0u32, 0u32), |(s, c), r| (s + r as u32, c + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn stats(pool: &sqlx::Pool<sqlx::Sqlite>, book_id: i64) -> (f64, i64) {
    let book = BookRepositoryImpl::new(pool.clone())
        .get(book_id)
        .await
        .unwrap();
    (book.average_rating, book.total_reviews)
}

fn review(book_id: i64, rating: u8) -> CreateReview {
    CreateReview {
        book_id,
        rating,
        comment: format!("Worth {rating} stars"),
    }
}

#[tokio::test]
async fn test_rating_scenario() {
    let pool = init_db().await;
    let lifecycle = ReviewLifecycle::new(pool.clone());
    assert_eq!(stats(&pool, 1).await, (0.0, 0));

    let r1 = lifecycle.create(2, review(1, 4)).await.unwrap();
    assert_eq!(r1.user.name, "Alice");
    assert_eq!(stats(&pool, 1).await, (4.0, 1));

    let r2 = lifecycle.create(3, review(1, 2)).await.unwrap();
    assert_eq!(stats(&pool, 1).await, (3.0, 2));

    let updated = lifecycle
        .update(
            r1.review.id,
            2,
            UpdateReview {
                rating: Some(5),
                comment: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.review.rating, 5);
    assert_eq!(updated.review.comment, "Worth 4 stars");
    assert_eq!(stats(&pool, 1).await, (3.5, 2));

    let book = BookRepositoryImpl::new(pool.clone()).get(1).await.unwrap();
    assert_eq!(book.rating, "3.5");

    lifecycle.delete(r2.review.id, 3).await.unwrap();
    assert_eq!(stats(&pool, 1).await, (5.0, 1));

    lifecycle.delete(r1.review.id, 2).await.unwrap();
    assert_eq!(stats(&pool, 1).await, (0.0, 0));

    // other book untouched
    assert_eq!(stats(&pool, 2).await, (0.0, 0));
}

#[tokio::test]
async fn test_rounding() {
    let pool = init_db().await;
    let lifecycle = ReviewLifecycle::new(pool.clone());
    lifecycle.create(1, review(1, 5)).await.unwrap();
    lifecycle.create(2, review(1, 4)).await.unwrap();
    lifecycle.create(3, review(1, 5)).await.unwrap();
    assert_eq!(stats(&pool, 1).await, (4.67, 3));
    let book = BookRepositoryImpl::new(pool.clone()).get(1).await.unwrap();
    assert_eq!(book.rating, "4.7");
}

#[tokio::test]
async fn test_duplicate_review() {
    let pool = init_db().await;
    let lifecycle = ReviewLifecycle::new(pool.clone());
    let original = lifecycle.create(2, review(1, 4)).await.unwrap();

    let res = lifecycle.create(2, review(1, 1)).await;
    assert!(matches!(
        res,
        Err(Error::DuplicateReview {
            book_id: 1,
            user_id: 2
        })
    ));
    assert_eq!(stats(&pool, 1).await, (4.0, 1));
    let repo = ReviewRepositoryImpl::new(pool.clone());
    let stored = repo.get(original.review.id).await.unwrap();
    assert_eq!(stored.review.rating, 4);

    // same user can review another book
    lifecycle.create(2, review(2, 1)).await.unwrap();
}

#[tokio::test]
async fn test_missing_book_or_user() {
    let pool = init_db().await;
    let lifecycle = ReviewLifecycle::new(pool.clone());
    let res = lifecycle.create(2, review(999, 4)).await;
    assert!(matches!(res, Err(Error::RecordNotFound(what)) if what == "Book"));
    let res = lifecycle.create(999, review(1, 4)).await;
    assert!(matches!(res, Err(Error::RecordNotFound(what)) if what == "User"));
    assert_eq!(stats(&pool, 1).await, (0.0, 0));
}

#[tokio::test]
async fn test_ownership() {
    let pool = init_db().await;
    let lifecycle = ReviewLifecycle::new(pool.clone());
    let r = lifecycle.create(2, review(1, 3)).await.unwrap();
    let id = r.review.id;

    // admin role does not matter, only owner can change review
    let res = lifecycle
        .update(
            id,
            1,
            UpdateReview {
                rating: Some(1),
                comment: Some("Mine now".into()),
            },
        )
        .await;
    assert!(matches!(res, Err(Error::NotReviewOwner { review_id }) if review_id == id));
    let res = lifecycle.delete(id, 3).await;
    assert!(matches!(res, Err(Error::NotReviewOwner { .. })));

    let stored = ReviewRepositoryImpl::new(pool.clone())
        .get(id)
        .await
        .unwrap();
    assert_eq!(stored.review.rating, 3);
    assert_eq!(stored.review.comment, "Worth 3 stars");
    assert_eq!(stats(&pool, 1).await, (3.0, 1));

    let res = lifecycle.delete(12345, 2).await;
    assert!(matches!(res, Err(Error::RecordNotFound(_))));
    let res = lifecycle.update(12345, 2, UpdateReview::default()).await;
    assert!(matches!(res, Err(Error::RecordNotFound(_))));
}

#[tokio::test]
async fn test_helpful() {
    let pool = init_db().await;
    let lifecycle = ReviewLifecycle::new(pool.clone());
    let r = lifecycle.create(2, review(1, 3)).await.unwrap();
    assert_eq!(r.review.helpful, 0);
    assert_eq!(lifecycle.mark_helpful(r.review.id).await.unwrap(), 1);
    assert_eq!(lifecycle.mark_helpful(r.review.id).await.unwrap(), 2);
    assert_eq!(lifecycle.mark_helpful(r.review.id).await.unwrap(), 3);
    assert!(matches!(
        lifecycle.mark_helpful(999).await,
        Err(Error::RecordNotFound(_))
    ));
}

#[tokio::test]
async fn test_book_delete_cascade() {
    let pool = init_db().await;
    let lifecycle = ReviewLifecycle::new(pool.clone());
    let catalog = Catalog::new(pool.clone());
    lifecycle.create(2, review(1, 3)).await.unwrap();
    lifecycle.create(3, review(1, 5)).await.unwrap();
    lifecycle.create(3, review(2, 5)).await.unwrap();

    let user = ApiClaim::new_expired("2", [Role::User]);
    assert!(matches!(
        catalog.delete(&user, 1).await,
        Err(Error::AdminRequired)
    ));

    let admin = ApiClaim::new_expired("1", [Role::Admin]);
    catalog.delete(&admin, 1).await.unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM review WHERE book_id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    let repo = ReviewRepositoryImpl::new(pool.clone());
    let mine = repo
        .list_for_user(3, ListingParams::default())
        .await
        .unwrap();
    assert_eq!(mine.total, 1);
    assert_eq!(mine.rows[0].book.title, "Emma");

    assert!(matches!(
        catalog.delete(&admin, 1).await,
        Err(Error::RecordNotFound(_))
    ));
}

#[tokio::test]
async fn test_reconciliation() {
    let pool = init_db().await;
    let lifecycle = ReviewLifecycle::new(pool.clone());
    lifecycle.create(2, review(1, 3)).await.unwrap();
    lifecycle.create(3, review(1, 4)).await.unwrap();

    sqlx::query("UPDATE book SET average_rating = 1.23, total_reviews = 7 WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap();

    let fixed = rating::reconcile_all(&pool).await.unwrap();
    assert_eq!(fixed, vec![1]);
    assert_eq!(stats(&pool, 1).await, (3.5, 2));

    let fixed = rating::reconcile_all(&pool).await.unwrap();
    assert!(fixed.is_empty());

    let recomputed = rating::recompute_from_scratch(2, &pool).await.unwrap().unwrap();
    assert_eq!(recomputed.total_reviews, 0);
    assert_eq!(recomputed.average_rating, 0.0);
    assert!(
        rating::recompute_from_scratch(999, &pool)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_concurrent_creation() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_file_db(&dir).await;

    let lifecycle = ReviewLifecycle::new(pool.clone());
    let mut tasks = Vec::new();
    // same user twice, only one may succeed
    for (user_id, rating) in [(1, 5), (2, 4), (3, 3), (2, 1)] {
        let lifecycle = lifecycle.clone();
        tasks.push(tokio::spawn(async move {
            lifecycle.create(user_id, review(1, rating)).await
        }));
    }
    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::DuplicateReview { .. }) => conflicts += 1,
            Err(e) => panic!("Unexpected error: {e}"),
        }
    }
    assert_eq!(created, 3);
    assert_eq!(conflicts, 1);

    let (average, total) = stats(&pool, 1).await;
    assert_eq!(total, 3);
    let ratings: Vec<i64> = sqlx::query_scalar("SELECT rating FROM review WHERE book_id = 1")
        .fetch_all(&pool)
        .await
        .unwrap();
    let mean = ratings.iter().sum::<i64>() as f64 / ratings.len() as f64;
    assert!((average - mean).abs() < 0.02, "{average} vs {mean}");
}

#[tokio::test]
async fn test_concurrent_mixed_changes() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_file_db(&dir).await;
    add_readers(&pool, 10..=21).await;

    let lifecycle = ReviewLifecycle::new(pool.clone());
    let mut existing = Vec::new();
    for (user_id, rating) in (10..18).zip([1, 2, 3, 4, 5, 4, 3, 2]) {
        let created = lifecycle.create(user_id, review(1, rating)).await.unwrap();
        existing.push((created.review.id, user_id));
    }

    let mut tasks = tokio::task::JoinSet::new();
    for (i, (review_id, user_id)) in existing.into_iter().enumerate() {
        let lifecycle = lifecycle.clone();
        match i {
            0 | 2 | 4 | 6 => tasks.spawn(async move {
                let change = UpdateReview {
                    rating: Some(5),
                    comment: None,
                };
                lifecycle.update(review_id, user_id, change).await.map(|_| ())
            }),
            1 | 3 => tasks.spawn(async move { lifecycle.delete(review_id, user_id).await }),
            _ => continue,
        };
    }
    for (user_id, rating) in (18..22).zip([1, 3, 4, 2]) {
        let lifecycle = lifecycle.clone();
        tasks.spawn(async move {
            lifecycle
                .create(user_id, review(1, rating))
                .await
                .map(|_| ())
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap().unwrap();
    }

    let (average, total) = stats(&pool, 1).await;
    assert_eq!(total, 10);
    assert_eq!(total, count_reviews(&pool, 1).await);
    assert!((0.0..=5.0).contains(&average));
    // 5, 5, 5, 4, 5, 2 kept or changed, 1, 3, 4, 2 added
    assert!((average - 3.6).abs() < 0.1, "{average}");

    let recomputed = rating::recompute_from_scratch(1, &pool).await.unwrap().unwrap();
    assert_eq!(recomputed.total_reviews, 10);
    assert!((recomputed.average_rating - 3.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_average_stays_in_range() {
    let pool = init_db().await;
    add_readers(&pool, 10..=16).await;
    let lifecycle = ReviewLifecycle::new(pool.clone());

    let mut created = Vec::new();
    for (user_id, rating) in (10..).zip([5, 1, 1, 1, 1, 1, 2]) {
        let r = lifecycle.create(user_id, review(1, rating)).await.unwrap();
        created.push((r.review.id, user_id));
    }
    assert_eq!(stats(&pool, 1).await.1, 7);

    for (remaining, (review_id, user_id)) in created.iter().enumerate().skip(1).rev() {
        lifecycle.delete(*review_id, *user_id).await.unwrap();
        let (average, total) = stats(&pool, 1).await;
        assert_eq!(total, remaining as i64);
        assert!(
            (0.0..=5.0).contains(&average),
            "{average} with {total} reviews"
        );
    }
    assert_eq!(stats(&pool, 1).await, (5.0, 1));

    let res = sqlx::query("UPDATE book SET average_rating = 5.04 WHERE id = 1")
        .execute(&pool)
        .await;
    assert!(res.is_err());
}

const READERS: std::ops::RangeInclusive<i64> = 10..=16;

#[derive(Debug, Clone, Copy)]
enum ReviewOp {
    Create(i64, u8),
    Update(i64, u8),
    Delete(i64),
}

impl Arbitrary for ReviewOp {
    fn arbitrary(g: &mut Gen) -> Self {
        let readers = READERS.count() as u8;
        let user_id = READERS.start() + (u8::arbitrary(g) % readers) as i64;
        let rating = u8::arbitrary(g) % 5 + 1;
        match u8::arbitrary(g) % 3 {
            0 => ReviewOp::Create(user_id, rating),
            1 => ReviewOp::Update(user_id, rating),
            _ => ReviewOp::Delete(user_id),
        }
    }
}

async fn run_review_sequence(ops: Vec<ReviewOp>) {
    let pool = init_db().await;
    add_readers(&pool, READERS).await;
    let lifecycle = ReviewLifecycle::new(pool.clone());

    // user id -> (review id, rating)
    let mut reviews: HashMap<i64, (i64, u8)> = HashMap::new();
    let mut applied = 0;
    for op in ops.into_iter().take(40) {
        match op {
            ReviewOp::Create(user_id, rating) => {
                let res = lifecycle.create(user_id, review(1, rating)).await;
                if reviews.contains_key(&user_id) {
                    assert!(matches!(res, Err(Error::DuplicateReview { .. })));
                    continue;
                }
                reviews.insert(user_id, (res.unwrap().review.id, rating));
            }
            ReviewOp::Update(user_id, rating) => {
                let Some(entry) = reviews.get_mut(&user_id) else {
                    continue;
                };
                let change = UpdateReview {
                    rating: Some(rating),
                    comment: None,
                };
                lifecycle.update(entry.0, user_id, change).await.unwrap();
                entry.1 = rating;
            }
            ReviewOp::Delete(user_id) => {
                let Some((review_id, _)) = reviews.remove(&user_id) else {
                    continue;
                };
                lifecycle.delete(review_id, user_id).await.unwrap();
            }
        }
        applied += 1;

        let (average, total) = stats(&pool, 1).await;
        assert_eq!(total, reviews.len() as i64);
        assert_eq!(total, count_reviews(&pool, 1).await);
        assert!((0.0..=5.0).contains(&average), "{average} after {op:?}");
        // each step rounds to 2 places, so error of the sum grows by at most 0.005 * reviews,
        // a single remaining review is exact
        let expected = mean(reviews.values().map(|(_, r)| *r));
        let tolerance = 0.005 * READERS.count() as f64 / 2.0 * applied as f64;
        assert!(
            (average - expected).abs() <= tolerance + 1e-9,
            "{average} vs {expected} after {applied} changes"
        );
    }

    let recomputed = rating::recompute_from_scratch(1, &pool).await.unwrap().unwrap();
    assert_eq!(recomputed.total_reviews, reviews.len() as i64);
    let expected = round2(mean(reviews.values().map(|(_, r)| *r)));
    assert!((recomputed.average_rating - expected).abs() < 1e-9);
    assert!(rating::reconcile_all(&pool).await.unwrap().is_empty());
}

#[quickcheck]
fn test_random_review_sequence(ops: Vec<ReviewOp>) {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(run_review_sequence(ops));
}
