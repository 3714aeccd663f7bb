use bookrev_e2e_tests::{prepare_env, spawn_server};
use tracing::info;
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn test_health() {
    let (args, _config_guard) = prepare_env("test_health").await.unwrap();
    let base_url = args.base_url.clone();

    spawn_server(args).await.unwrap();

    let client = reqwest::Client::new();

    let url = base_url.join("health").unwrap();
    let response = client.get(url).send().await.unwrap();
    info! {"Response: {:#?}", response};
    assert!(response.status().is_success());
}

#[tokio::test]
#[traced_test]
async fn test_invalid_token() {
    let (args, _config_guard) = prepare_env("test_invalid_token").await.unwrap();
    let base_url = args.base_url.clone();

    spawn_server(args).await.unwrap();

    let client = reqwest::Client::new();
    let url = base_url.join("api/book").unwrap();

    let response = client.get(url.clone()).send().await.unwrap();
    assert!(response.status().is_success());

    let response = client
        .get(url)
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    info! {"Response: {:#?}", response};
    assert_eq!(401, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!("unauthorized", body["error"]);
}
