use crate::{
    auth::token::RequiredRolesLayer,
    error::{ApiError, ApiResult},
    rest_api::{Page, Paging},
    state::AppState,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json,
};
use axum_valid::Garde;
use bookrev_dal::{
    book::{BookRepository, CreateBook, UpdateBook},
    ListingParams,
};
use bookrev_types::claim::{ApiClaim, Role};
use garde::Validate;
use http::StatusCode;
use tracing::debug;

pub const COVER_FIELD: &str = "cover";

crate::repository_from_request!(BookRepository);

#[derive(Debug, Clone, Validate, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct SuggestQuery {
    #[garde(length(max = 255))]
    q: String,
}

#[derive(Debug, Clone, Validate, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct CountQuery {
    #[garde(inner(length(max = 255)))]
    search: Option<String>,
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "", tag = "Book", operation_id = "listBooks",
    params(Paging), responses((status = StatusCode::OK, description = "List paginated", body = Page<bookrev_dal::book::BookShort>))))]
pub async fn list(
    repository: BookRepository,
    State(state): State<AppState>,
    Garde(Query(paging)): Garde<Query<Paging>>,
) -> ApiResult<impl IntoResponse> {
    let default_page_size = state.config().default_page_size;
    let page_size = paging.page_size(default_page_size);
    let listing_params = paging.into_listing_params(default_page_size)?;
    let batch = repository.list(listing_params).await?;
    Ok((StatusCode::OK, Json(Page::from_batch(batch, page_size))))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/suggestions", tag = "Book", operation_id = "suggestBooks",
    params(SuggestQuery), responses((status = StatusCode::OK, description = "Matching books", body = Vec<bookrev_dal::book::BookSuggestion>))))]
pub async fn suggest(
    repository: BookRepository,
    Garde(Query(query)): Garde<Query<SuggestQuery>>,
) -> ApiResult<impl IntoResponse> {
    let suggestions = repository.suggest(&query.q).await?;
    Ok((StatusCode::OK, Json(suggestions)))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/count", tag = "Book", operation_id = "countBooks",
    params(CountQuery), responses((status = StatusCode::OK, description = "Count", body = u64))))]
pub async fn count(
    repository: BookRepository,
    Garde(Query(query)): Garde<Query<CountQuery>>,
) -> ApiResult<impl IntoResponse> {
    let mut params = ListingParams::default();
    params.filter = query.search;
    let count = repository.count(&params).await?;
    Ok((StatusCode::OK, Json(count)))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/{id}", tag = "Book", operation_id = "getBook",
    responses((status = StatusCode::OK, description = "Book with reviews", body = bookrev_dal::catalog::BookDetail))))]
pub async fn get_with_reviews(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.catalog().get_with_reviews(id).await?;
    Ok((StatusCode::OK, Json(detail)))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "", tag = "Book", operation_id = "createBook",
    responses((status = StatusCode::CREATED, description = "Created", body = bookrev_dal::book::Book))))]
pub async fn create(
    claim: ApiClaim,
    State(state): State<AppState>,
    Garde(Json(mut payload)): Garde<Json<CreateBook>>,
) -> ApiResult<impl IntoResponse> {
    payload.created_by = Some(claim.sub.clone());
    let book = state.catalog().create(&claim, payload).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

#[cfg_attr(feature = "openapi", utoipa::path(put, path = "/{id}", tag = "Book", operation_id = "updateBook",
    responses((status = StatusCode::OK, description = "Updated", body = bookrev_dal::book::Book))))]
pub async fn update(
    Path(id): Path<i64>,
    claim: ApiClaim,
    State(state): State<AppState>,
    Garde(Json(payload)): Garde<Json<UpdateBook>>,
) -> ApiResult<impl IntoResponse> {
    let book = state.catalog().update(&claim, id, payload).await?;
    Ok((StatusCode::OK, Json(book)))
}

#[cfg_attr(feature = "openapi", utoipa::path(delete, path = "/{id}", tag = "Book", operation_id = "deleteBook",
    responses((status = StatusCode::NO_CONTENT, description = "Deleted with all reviews"))))]
pub async fn delete(
    Path(id): Path<i64>,
    claim: ApiClaim,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    state.catalog().delete(&claim, id).await?;
    Ok((StatusCode::NO_CONTENT, ()))
}

#[cfg(feature = "openapi")]
#[derive(serde::Deserialize, utoipa::ToSchema)]
#[allow(unused)]
struct CoverForm {
    #[schema(value_type = String, format = Binary, content_media_type = "application/octet-stream")]
    cover: String,
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/{id}/cover", tag = "Book", operation_id = "uploadCover",
    request_body(content = CoverForm, content_type = "multipart/form-data"),
    responses((status = StatusCode::OK, description = "Book with new cover", body = bookrev_dal::book::Book))))]
pub async fn upload_cover(
    Path(id): Path<i64>,
    claim: ApiClaim,
    State(state): State<AppState>,
    repository: BookRepository,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    // fail early, before anything is uploaded
    repository.get(id).await?;

    let mut data = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(COVER_FIELD) {
            data = Some(field.bytes().await?);
            break;
        }
    }
    let data = data.ok_or_else(|| {
        ApiError::InvalidRequest(format!("Missing multipart field {COVER_FIELD}"))
    })?;
    debug!("Received cover for book {id}, size {}", data.len());

    let cover = tokio::task::spawn_blocking(move || bookrev_image::normalize_cover(&data))
        .await
        .map_err(|e| ApiError::Internal(format!("Image processing task failed: {e}")))?
        .map_err(|e| ApiError::UnprocessableRequest(format!("Invalid image: {e}")))?;

    let url = state.covers().store(&cover).await?;
    let book = state.catalog().set_cover(&claim, id, url.as_str()).await?;
    Ok((StatusCode::OK, Json(book)))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/{id}/recompute", tag = "Book", operation_id = "recomputeBookRating",
    responses((status = StatusCode::OK, description = "Recomputed rating", body = bookrev_dal::rating::RatingStats))))]
pub async fn recompute_rating(
    Path(id): Path<i64>,
    claim: ApiClaim,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let stats = state.catalog().recompute_rating(&claim, id).await?;
    Ok((StatusCode::OK, Json(stats)))
}

pub fn router(upload_limit_mb: usize) -> axum::Router<AppState> {
    let admin = axum::Router::new()
        .route(
            "/{id}/cover",
            post(upload_cover).layer(DefaultBodyLimit::max(1024 * 1024 * upload_limit_mb)),
        )
        .route("/{id}/recompute", post(recompute_rating))
        .layer(RequiredRolesLayer::new([Role::Admin]));

    axum::Router::new()
        .route("/", get(list).post(create))
        .route("/suggestions", get(suggest))
        .route("/count", get(count))
        .route("/{id}", get(get_with_reviews).put(update).delete(delete))
        .merge(admin)
}

#[cfg(feature = "openapi")]
pub fn api_docs() -> utoipa::openapi::OpenApi {
    use utoipa::OpenApi as _;
    #[derive(utoipa::OpenApi)]
    #[openapi(paths(
        list,
        suggest,
        count,
        get_with_reviews,
        create,
        update,
        delete,
        upload_cover,
        recompute_rating
    ))]
    struct ApiDocs;
    ApiDocs::openapi()
}
