use anyhow::{Result, anyhow};
use bookrev_dal::{book::Book, review::ReviewWithUser};
use reqwest::{StatusCode, Url};
use serde_json::json;
use tracing::info;

pub async fn create_book(
    client: &reqwest::Client,
    base_url: &Url,
    title: &str,
    author: &str,
) -> Result<Book> {
    let payload = json!({
        "title": title,
        "author": author,
        "description": format!("{title} by {author}"),
    });
    let api_url = base_url.join("api/book")?;

    let response = client.post(api_url).json(&payload).send().await?;
    info!("Book Response: {:#?}", response);
    if response.status() != StatusCode::CREATED {
        return Err(anyhow!("Book not created: {}", response.status()));
    }

    let book: Book = response.json().await?;
    Ok(book)
}

pub async fn create_review(
    client: &reqwest::Client,
    base_url: &Url,
    book_id: i64,
    rating: u8,
    comment: &str,
) -> Result<ReviewWithUser> {
    let payload = json!({"book_id": book_id, "rating": rating, "comment": comment});
    let api_url = base_url.join("api/review")?;

    let response = client.post(api_url).json(&payload).send().await?;
    info!("Review Response: {:#?}", response);
    if response.status() != StatusCode::CREATED {
        return Err(anyhow!("Review not created: {}", response.status()));
    }

    let review: ReviewWithUser = response.json().await?;
    Ok(review)
}

pub async fn get_book_json(
    client: &reqwest::Client,
    base_url: &Url,
    book_id: i64,
) -> Result<serde_json::Value> {
    let api_url = base_url.join(&format!("api/book/{book_id}"))?;
    let response = client.get(api_url).send().await?;
    if !response.status().is_success() {
        return Err(anyhow!("Book {book_id} not loaded: {}", response.status()));
    }
    Ok(response.json().await?)
}

/// Aggregate as returned in book detail: (average_rating, total_reviews, rating)
pub async fn book_rating(
    client: &reqwest::Client,
    base_url: &Url,
    book_id: i64,
) -> Result<(f64, i64, String)> {
    let detail = get_book_json(client, base_url, book_id).await?;
    let book = &detail["book"];
    let average = book["average_rating"]
        .as_f64()
        .ok_or_else(|| anyhow!("Missing average_rating"))?;
    let total = book["total_reviews"]
        .as_i64()
        .ok_or_else(|| anyhow!("Missing total_reviews"))?;
    let rating = book["rating"]
        .as_str()
        .ok_or_else(|| anyhow!("Missing rating"))?
        .to_string();
    Ok((average, total, rating))
}
