use crate::{
    auth::token::caller_id,
    error::ApiResult,
    rest_api::{Page, Paging},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json,
};
use axum_valid::Garde;
use bookrev_dal::review::{CreateReview, ReviewRepository, UpdateReview};
use bookrev_types::claim::ApiClaim;
use http::StatusCode;
use serde::Serialize;

crate::repository_from_request!(ReviewRepository);

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HelpfulCount {
    pub helpful: i64,
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/book/{book_id}", tag = "Review", operation_id = "listReviewsForBook",
    params(Paging), responses((status = StatusCode::OK, description = "Reviews of book", body = Page<bookrev_dal::review::ReviewWithUser>))))]
pub async fn list_for_book(
    Path(book_id): Path<i64>,
    repository: ReviewRepository,
    State(state): State<AppState>,
    Garde(Query(paging)): Garde<Query<Paging>>,
) -> ApiResult<impl IntoResponse> {
    let default_page_size = state.config().default_page_size;
    let page_size = paging.page_size(default_page_size);
    let params = paging.into_listing_params(default_page_size)?;
    let batch = repository.list_for_book(book_id, params).await?;
    Ok((StatusCode::OK, Json(Page::from_batch(batch, page_size))))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/user/{user_id}", tag = "Review", operation_id = "listReviewsForUser",
    params(Paging), responses((status = StatusCode::OK, description = "Reviews by user", body = Page<bookrev_dal::review::ReviewWithBook>))))]
pub async fn list_for_user(
    Path(user_id): Path<i64>,
    repository: ReviewRepository,
    State(state): State<AppState>,
    Garde(Query(paging)): Garde<Query<Paging>>,
) -> ApiResult<impl IntoResponse> {
    let default_page_size = state.config().default_page_size;
    let page_size = paging.page_size(default_page_size);
    let params = paging.into_listing_params(default_page_size)?;
    let batch = repository.list_for_user(user_id, params).await?;
    Ok((StatusCode::OK, Json(Page::from_batch(batch, page_size))))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/mine", tag = "Review", operation_id = "listMyReviews",
    params(Paging), responses((status = StatusCode::OK, description = "Reviews of caller", body = Page<bookrev_dal::review::ReviewWithBook>))))]
pub async fn list_mine(
    claim: ApiClaim,
    repository: ReviewRepository,
    State(state): State<AppState>,
    Garde(Query(paging)): Garde<Query<Paging>>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller_id(&claim)?;
    let default_page_size = state.config().default_page_size;
    let page_size = paging.page_size(default_page_size);
    let params = paging.into_listing_params(default_page_size)?;
    let batch = repository.list_for_user(user_id, params).await?;
    Ok((StatusCode::OK, Json(Page::from_batch(batch, page_size))))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "", tag = "Review", operation_id = "createReview",
    responses((status = StatusCode::CREATED, description = "Created", body = bookrev_dal::review::ReviewWithUser))))]
pub async fn create(
    claim: ApiClaim,
    State(state): State<AppState>,
    Garde(Json(payload)): Garde<Json<CreateReview>>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller_id(&claim)?;
    let review = state.reviews().create(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[cfg_attr(feature = "openapi", utoipa::path(put, path = "/{id}", tag = "Review", operation_id = "updateReview",
    responses((status = StatusCode::OK, description = "Updated", body = bookrev_dal::review::ReviewWithUser))))]
pub async fn update(
    Path(id): Path<i64>,
    claim: ApiClaim,
    State(state): State<AppState>,
    Garde(Json(payload)): Garde<Json<UpdateReview>>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller_id(&claim)?;
    let review = state.reviews().update(id, user_id, payload).await?;
    Ok((StatusCode::OK, Json(review)))
}

#[cfg_attr(feature = "openapi", utoipa::path(delete, path = "/{id}", tag = "Review", operation_id = "deleteReview",
    responses((status = StatusCode::NO_CONTENT, description = "Deleted"))))]
pub async fn delete(
    Path(id): Path<i64>,
    claim: ApiClaim,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let user_id = caller_id(&claim)?;
    state.reviews().delete(id, user_id).await?;
    Ok((StatusCode::NO_CONTENT, ()))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/{id}/helpful", tag = "Review", operation_id = "markReviewHelpful",
    responses((status = StatusCode::OK, description = "New helpful count", body = HelpfulCount))))]
pub async fn mark_helpful(
    Path(id): Path<i64>,
    // any authenticated user can vote
    _claim: ApiClaim,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let helpful = state.reviews().mark_helpful(id).await?;
    Ok((StatusCode::OK, Json(HelpfulCount { helpful })))
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", post(create))
        .route("/book/{book_id}", get(list_for_book))
        .route("/user/{user_id}", get(list_for_user))
        .route("/mine", get(list_mine))
        .route("/{id}", put(update).delete(delete))
        .route("/{id}/helpful", post(mark_helpful))
}

#[cfg(feature = "openapi")]
pub fn api_docs() -> utoipa::openapi::OpenApi {
    use utoipa::OpenApi as _;
    #[derive(utoipa::OpenApi)]
    #[openapi(paths(
        list_for_book,
        list_for_user,
        list_mine,
        create,
        update,
        delete,
        mark_helpful
    ))]
    struct ApiDocs;
    ApiDocs::openapi()
}
