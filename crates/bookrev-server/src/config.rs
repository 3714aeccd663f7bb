use std::{path::PathBuf, time::Duration};

use crate::error::Result;
use bookrev_app::state::AppConfig;
use bookrev_types::config::BackendConfig;
pub use clap::Parser;
use url::Url;

#[derive(Debug, Clone, clap::Parser)]
#[command(version, about)]
pub struct ServerConfig {
    #[arg(
        short,
        long,
        default_value_t = 3000,
        env = "BOOKREV_LISTEN_PORT",
        help = "Port to listen on"
    )]
    pub port: u16,
    #[arg(
        short,
        long,
        default_value = "127.0.0.1",
        env = "BOOKREV_LISTEN_ADDRESS",
        help = "Address to listen on"
    )]
    pub listen_address: String,

    #[arg(
        long,
        env = "BOOKREV_BASE_URL",
        default_value = "http://localhost:3000",
        help = "Base URL of server, as visible to users, locally hosted covers are linked relative to it"
    )]
    pub base_url: Url,

    #[command(flatten)]
    pub backend: BackendConfig,

    #[arg(
        long,
        env = "BOOKREV_IMAGE_HOST_URL",
        help = "Upload endpoint of remote image hosting service, if not set covers are hosted locally"
    )]
    pub image_host_url: Option<Url>,

    #[arg(
        long,
        env = "BOOKREV_TOKEN_VALIDITY",
        default_value = "1 day",
        help = "Default token validity in human friendly format (e.g. 1d, 1h, 1m, 1s - or combined)",
        value_parser = humantime::parse_duration
    )]
    pub token_validity: Duration,

    #[arg(
        long,
        env = "BOOKREV_UPLOAD_LIMIT_MB",
        default_value = "10",
        help = "Maximum size of uploaded cover image in MB"
    )]
    pub upload_limit_mb: usize,

    #[arg(
        long,
        env = "BOOKREV_DEFAULT_PAGE_SIZE",
        default_value = "20",
        help = "Default page size"
    )]
    pub default_page_size: u32,

    #[arg(long, env = "BOOKREV_CORS", help = "Enable permissive CORS")]
    pub cors: bool,

    #[arg(
        long,
        env = "BOOKREV_RECONCILE_INTERVAL",
        default_value = "1h",
        help = "How often book ratings are checked against reviews, 0s disables the check",
        value_parser = humantime::parse_duration
    )]
    pub reconcile_interval: Duration,
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        ServerConfig::try_parse().map_err(|e| e.into())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.backend.data_dir()
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.backend.covers_dir()
    }

    pub fn database_url(&self) -> String {
        self.backend.database_url()
    }
}

impl From<&ServerConfig> for AppConfig {
    fn from(config: &ServerConfig) -> Self {
        AppConfig {
            base_url: config.base_url.clone(),
            upload_limit_mb: config.upload_limit_mb,
            default_page_size: config.default_page_size,
        }
    }
}
