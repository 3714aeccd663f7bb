use clap::Parser;
use std::{fs, path::PathBuf};

/// Storage locations shared by the server and the CLI.
#[derive(Debug, Clone, Parser)]
pub struct BackendConfig {
    #[arg(
        long,
        env = "BOOKREV_DATABASE_URL",
        help = "Database URL e.g. sqlite://file.db, default is sqlite://[data-dir]/bookrev.db, where data-dir is set by --data-dir"
    )]
    database_url: Option<String>,

    #[arg(
        long,
        env = "BOOKREV_DATA_DIR",
        help = "Data directory (database, covers, token secret), default is system default like ~/.local/share/bookrev",
        default_value_t = default_data_dir()
    )]
    data_dir: String,

    #[arg(
        long,
        env = "BOOKREV_COVERS_DIR",
        help = "Directory for locally hosted cover images, default data_dir/covers"
    )]
    covers_dir: Option<PathBuf>,
}

fn default_data_dir() -> String {
    let dir = dirs::data_dir()
        .map(|p| p.join("bookrev"))
        .unwrap_or_else(|| PathBuf::from("bookrev"));

    if !fs::exists(&dir).expect("Failed to check if data directory exists") {
        fs::create_dir_all(&dir).expect("Failed to create data directory");
    } else if !dir.is_dir() {
        panic!("Data directory is not a directory",)
    }

    dir.to_string_lossy().to_string()
}

impl BackendConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.covers_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("covers"))
    }

    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}/bookrev.db", self.data_dir))
    }
}
