use std::path::Path;

use crate::config::ServerConfig;
use crate::error::Result;
use axum::http::StatusCode;
use axum::{response::IntoResponse, routing::get, Router};
use bookrev_app::auth::token::TokenLayer;
use bookrev_app::cover::{CoverHost, LocalCovers, RemoteCovers, COVERS_PATH};
use bookrev_app::state::{AppConfig, AppState};
use futures::FutureExt;
use tokio::{fs, io::AsyncWriteExt as _};
use tracing::{debug, error, info};

pub async fn run(args: ServerConfig) -> Result<()> {
    let state = build_state(&args).await?;
    run_with_state(args, state).await
}

pub async fn run_with_state(args: ServerConfig, state: AppState) -> Result<()> {
    let shutdown = tokio::signal::ctrl_c().map(|_| ());
    run_graceful_with_state(args, state, shutdown).await
}

pub async fn run_graceful_with_state<S>(
    args: ServerConfig,
    state: AppState,
    shutdown_signal: S,
) -> Result<()>
where
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let mut app = main_router(state.clone());

    if args.cors {
        app = app.layer(tower_http::cors::CorsLayer::very_permissive());
    }

    let reconciler = if args.reconcile_interval.is_zero() {
        None
    } else {
        Some(tokio::spawn(reconcile_periodically(
            state.clone(),
            args.reconcile_interval,
        )))
    };

    let ip: std::net::IpAddr = args.listen_address.parse()?;
    let addr = std::net::SocketAddr::from((ip, args.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    let res = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await;

    if let Some(reconciler) = reconciler {
        reconciler.abort();
    }
    res?;
    Ok(())
}

async fn reconcile_periodically(state: AppState, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        match bookrev_dal::rating::reconcile_all(state.pool()).await {
            Ok(fixed) if fixed.is_empty() => debug!("Book ratings are consistent"),
            Ok(fixed) => info!("Fixed rating of books {fixed:?}"),
            Err(e) => error!("Rating reconciliation failed: {e}"),
        }
    }
}

#[cfg(feature = "openapi")]
fn api_docs() -> utoipa::openapi::OpenApi {
    use utoipa::openapi::Components;

    #[derive(utoipa::OpenApi)]
    #[openapi(modifiers(&SecurityAddon), security(("bearer" = [])))]
    struct OpenApi;

    struct SecurityAddon;

    impl utoipa::Modify for SecurityAddon {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

            openapi
                .components
                .get_or_insert_with(Components::new)
                .add_security_scheme(
                    "bearer",
                    SecurityScheme::Http(
                        HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build(),
                    ),
                );
        }
    }

    use utoipa::OpenApi as _;
    OpenApi::openapi()
        .nest("/api/book", bookrev_app::rest_api::book::api_docs())
        .nest("/api/review", bookrev_app::rest_api::review::api_docs())
}

pub fn main_router(state: AppState) -> Router<()> {
    let covers_dir = state.covers().local_dir().map(Path::to_path_buf);

    #[allow(unused_mut)]
    let mut router = Router::new()
        .nest(
            "/api/book",
            bookrev_app::rest_api::book::router(state.config().upload_limit_mb),
        )
        .nest("/api/review", bookrev_app::rest_api::review::router())
        // token is optional for reads, mutations check claims
        .layer(TokenLayer::new(state.clone()))
        .with_state(state)
        .route("/health", get(health));

    if let Some(dir) = covers_dir {
        router = router.nest_service(
            &format!("/{COVERS_PATH}"),
            tower_http::services::ServeDir::new(dir),
        );
    }

    #[cfg(feature = "openapi")]
    {
        let docs = api_docs();
        router = router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs),
        );
    }
    router
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn build_state(config: &ServerConfig) -> Result<AppState> {
    let data_dir = config.data_dir();
    if !data_dir.is_dir() {
        fs::create_dir_all(&data_dir).await?;
        info!("Created data directory {data_dir:?}");
    }

    let app_config: AppConfig = config.into();

    let covers = match &config.image_host_url {
        Some(url) => {
            info!("Covers are uploaded to {url}");
            CoverHost::Remote(RemoteCovers::new(url.clone()))
        }
        None => {
            let dir = config.covers_dir();
            if !dir.is_dir() {
                fs::create_dir_all(&dir).await?;
                info!("Created directory for covers {dir:?}");
            }
            CoverHost::Local(LocalCovers::new(dir, &app_config.base_url)?)
        }
    };

    let pool = bookrev_dal::new_pool(&config.database_url()).await?;
    bookrev_dal::migrate(&pool).await?;

    let secret = read_secret(&data_dir).await?;
    let tokens = bookrev_auth::token::TokenManager::new(&secret, config.token_validity)?;
    Ok(AppState::new(app_config, pool, tokens, covers))
}

pub async fn read_secret(data_dir: &Path) -> Result<Vec<u8>, std::io::Error> {
    let secret_file = data_dir.join("secret");

    let secret = if fs::try_exists(&secret_file).await? {
        fs::read(&secret_file).await?
    } else {
        let random_bytes = rand::random::<[u8; 32]>();
        #[cfg(unix)]
        let mut file = {
            use std::fs::OpenOptions;
            use std::os::unix::fs::OpenOptionsExt;
            {
                // only accessible by the current user
                let _f = OpenOptions::new()
                    .mode(0o600)
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&secret_file)?;
            }
            fs::File::options().write(true).open(&secret_file).await?
        };
        #[cfg(not(unix))]
        let mut file = fs::File::create(&secret_file).await?;

        file.write_all(&random_bytes).await?;
        random_bytes.as_ref().to_vec()
    };
    Ok(secret)
}
