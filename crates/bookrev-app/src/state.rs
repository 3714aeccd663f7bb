use std::sync::Arc;

use crate::cover::CoverHost;
use bookrev_auth::token::TokenManager;
use bookrev_dal::{catalog::Catalog, lifecycle::ReviewLifecycle, Pool};
use url::Url;

#[derive(Clone)]
pub struct AppState {
    state: Arc<AppStateInner>,
}

impl AppState {
    pub fn new(app_config: AppConfig, pool: Pool, tokens: TokenManager, covers: CoverHost) -> Self {
        AppState {
            state: Arc::new(AppStateInner {
                catalog: Catalog::new(pool.clone()),
                reviews: ReviewLifecycle::new(pool.clone()),
                app_config,
                pool,
                tokens,
                covers,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.app_config
    }

    pub fn pool(&self) -> &Pool {
        &self.state.pool
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.state.tokens
    }

    pub fn covers(&self) -> &CoverHost {
        &self.state.covers
    }

    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    pub fn reviews(&self) -> &ReviewLifecycle {
        &self.state.reviews
    }
}

struct AppStateInner {
    pool: Pool,
    tokens: TokenManager,
    covers: CoverHost,
    catalog: Catalog,
    reviews: ReviewLifecycle,
    app_config: AppConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: Url,
    pub upload_limit_mb: usize,
    pub default_page_size: u32,
}

/// Validation context of garde extractors
impl axum::extract::FromRef<AppState> for () {
    fn from_ref(_input: &AppState) -> Self {}
}
