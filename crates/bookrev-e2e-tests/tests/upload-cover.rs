use std::io::Cursor;

use bookrev_dal::book::Book;
use bookrev_e2e_tests::{TestUser, launch_env, prepare_env, rest::create_book, user_client};
use image::{ImageFormat, RgbImage};
use reqwest::multipart::{Form, Part};
use tracing::info;
use tracing_test::traced_test;

fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut data = Cursor::new(Vec::new());
    img.write_to(&mut data, ImageFormat::Jpeg).unwrap();
    data.into_inner()
}

fn cover_form(data: Vec<u8>) -> Form {
    let part = Part::bytes(data)
        .file_name("cover.jpg")
        .mime_str("image/jpeg")
        .unwrap();
    Form::new().part("cover", part)
}

#[tokio::test]
#[traced_test]
async fn test_upload_cover() {
    let (args, _config_guard) = prepare_env("test_upload_cover").await.unwrap();
    let base_url = args.base_url.clone();
    let covers_dir = args.covers_dir();

    let (admin, _, state) = launch_env(args, TestUser::Admin).await.unwrap();
    let (user, _) = user_client(&state, TestUser::User).await.unwrap();

    let book = create_book(&admin, &base_url, "Dune", "Frank Herbert")
        .await
        .unwrap();
    let cover_url = base_url
        .join(&format!("api/book/{}/cover", book.id))
        .unwrap();

    let response = user
        .post(cover_url.clone())
        .multipart(cover_form(sample_jpeg(100, 100)))
        .send()
        .await
        .unwrap();
    assert_eq!(403, response.status().as_u16());

    let response = admin
        .post(cover_url.clone())
        .multipart(cover_form(sample_jpeg(1200, 1200)))
        .send()
        .await
        .unwrap();
    info!("Response: {:#?}", response);
    assert!(response.status().is_success());
    let updated: Book = response.json().await.unwrap();
    assert_eq!(updated.version, book.version + 1);
    let image_url = updated.cover_image.unwrap();
    assert!(image_url.starts_with(base_url.join("covers/").unwrap().as_str()));

    let file_name = image_url.rsplit('/').next().unwrap();
    assert!(covers_dir.join(file_name).is_file());

    let response = reqwest::get(&image_url).await.unwrap();
    assert!(response.status().is_success());
    let data = response.bytes().await.unwrap();
    let stored = image::load_from_memory(&data).unwrap();
    assert_eq!((600, 600), (stored.width(), stored.height()));

    let response = admin
        .post(cover_url)
        .multipart(Form::new().part("cover", Part::bytes(b"not an image".to_vec())))
        .send()
        .await
        .unwrap();
    assert_eq!(422, response.status().as_u16());

    let missing_url = base_url.join("api/book/9999/cover").unwrap();
    let response = admin
        .post(missing_url)
        .multipart(cover_form(sample_jpeg(10, 10)))
        .send()
        .await
        .unwrap();
    assert_eq!(404, response.status().as_u16());
}
