use bookrev_types::config::BackendConfig;

pub mod create_user;
pub mod issue_token;
pub mod reconcile;
pub mod seed;

#[allow(async_fn_in_trait)]
pub trait Executor {
    async fn run(self) -> anyhow::Result<()>;
}

/// Opens database, creating it and applying migrations when needed
pub(crate) async fn open_db(backend: &BackendConfig) -> anyhow::Result<bookrev_dal::Pool> {
    let data_dir = backend.data_dir();
    if !data_dir.is_dir() {
        tokio::fs::create_dir_all(&data_dir).await?;
    }
    let pool = bookrev_dal::new_pool(&backend.database_url()).await?;
    bookrev_dal::migrate(&pool).await?;
    Ok(pool)
}
