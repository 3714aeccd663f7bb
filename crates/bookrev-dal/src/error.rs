pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("User {user_id} has already reviewed book {book_id}")]
    DuplicateReview { book_id: i64, user_id: i64 },

    #[error("Review {review_id} belongs to another user")]
    NotReviewOwner { review_id: i64 },

    #[error("Admin privileges required")]
    AdminRequired,

    #[error("Failed to update record {id} with version {version}")]
    FailedUpdate { id: i64, version: i64 },

    #[error("Missing version for update")]
    MissingVersion,

    #[error("Invalid order by field: {0}")]
    InvalidOrderByField(String),
}

impl Error {
    pub(crate) fn not_found(what: &str) -> Self {
        Error::RecordNotFound(what.to_string())
    }

    /// Turns missing row into [`Error::RecordNotFound`] for given entity
    pub(crate) fn missing_as(what: &str) -> impl FnOnce(sqlx::Error) -> Self + '_ {
        move |e| match e {
            sqlx::Error::RowNotFound => Error::not_found(what),
            other => Error::DatabaseError(other),
        }
    }
}
