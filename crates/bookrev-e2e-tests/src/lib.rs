use std::path::Path;

use anyhow::{Result, anyhow};
use bookrev_app::state::AppState;
use bookrev_dal::user::{CreateUser, User, UserRepository};
use bookrev_server::config::{Parser, ServerConfig};
use bookrev_types::claim::{ApiClaim, Role};
use rand::Rng as _;
use reqwest::{
    Url,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use tempfile::TempDir;
use tracing::{debug, info};

pub mod rest;

fn random_port() -> Result<u16> {
    let mut rng = rand::rng();

    let mut retries = 3;
    while retries > 0 {
        let port: u16 = rng.random_range(3030..4030);
        let addr: std::net::SocketAddr = format!("127.0.0.1:{}", port).parse()?;
        match std::net::TcpStream::connect_timeout(&addr, std::time::Duration::from_millis(100)) {
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => return Ok(port),
            Err(_) => retries -= 1,
            Ok(_) => retries -= 1,
        }
    }

    Err(anyhow!("Could not find a free port"))
}

pub struct ConfigGuard {
    #[allow(dead_code)]
    data_dir: TempDir,
}

pub fn test_config(test_name: &str, base_dir: &Path) -> Result<(ServerConfig, ConfigGuard)> {
    let tmp_data_dir = TempDir::with_prefix_in(format!("{}_", test_name), base_dir)?;
    let data_dir = tmp_data_dir.path().to_string_lossy().to_string();
    let port = random_port()?;
    let port = port.to_string();
    let base_url = format!("http://localhost:{}", port);
    let args = &[
        "bookrev-e2e-tests",
        "--data-dir",
        &data_dir,
        "--port",
        &port,
        "--base-url",
        &base_url,
        "--reconcile-interval",
        "0s",
    ];
    let config = ServerConfig::try_parse_from(args)?;
    Ok((
        config,
        ConfigGuard {
            data_dir: tmp_data_dir,
        },
    ))
}

pub async fn prepare_env(test_name: &str) -> Result<(ServerConfig, ConfigGuard)> {
    let base_dir = std::env::temp_dir().join("bookrev-e2e-tests");
    tokio::fs::create_dir_all(&base_dir).await?;
    test_config(test_name, &base_dir)
}

/// Starts server in background and waits until it answers health check
pub async fn spawn_server(args: ServerConfig) -> Result<AppState> {
    let state = bookrev_server::run::build_state(&args).await?;
    let health_url = args.base_url.join("health")?;
    let server_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = bookrev_server::run::run_with_state(args, server_state).await {
            tracing::error!("Server failed: {e}");
        }
    });

    let client = reqwest::Client::new();
    for _ in 0..50 {
        match client.get(health_url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Server is up");
                return Ok(state);
            }
            Ok(response) => debug!("Server not ready: {}", response.status()),
            Err(e) => debug!("Server not ready: {e}"),
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    Err(anyhow!("Server did not start"))
}

#[derive(Debug, Clone, Copy)]
pub enum TestUser {
    Admin,
    User,
    Named(&'static str),
}

impl TestUser {
    fn name(&self) -> &'static str {
        match self {
            TestUser::Admin => "admin",
            TestUser::User => "user",
            TestUser::Named(name) => *name,
        }
    }

    fn role(&self) -> Role {
        match self {
            TestUser::Admin => Role::Admin,
            _ => Role::User,
        }
    }
}

/// Creates user directly in database and returns client sending its bearer token
pub async fn user_client(state: &AppState, user: TestUser) -> Result<(reqwest::Client, User)> {
    let name = user.name();
    let new_user = CreateUser {
        email: format!("{}@example.com", name.to_lowercase()).parse()?,
        name: name.to_string(),
        avatar: None,
        role: user.role(),
    };
    let user = UserRepository::new(state.pool().clone())
        .create(new_user)
        .await?;
    let token = state
        .tokens()
        .issue(ApiClaim::new_expired(user.id.to_string(), [user.role]))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))?,
    );
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .build()?;
    Ok((client, user))
}

pub async fn launch_env(
    args: ServerConfig,
    user: TestUser,
) -> Result<(reqwest::Client, User, AppState)> {
    let state = spawn_server(args).await?;
    let (client, user) = user_client(&state, user).await?;
    Ok((client, user, state))
}

pub fn extend_url(url: &Url, segment: impl std::fmt::Display) -> Url {
    let mut url = url.clone();
    url.path_segments_mut()
        .map(|mut segments| {
            segments.pop_if_empty().push(&segment.to_string());
        })
        .ok();
    url
}
