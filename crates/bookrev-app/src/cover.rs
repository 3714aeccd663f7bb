//! Hosting of book cover images.
//!
//! Covers are either stored locally in covers directory, named by their SHA256 hash
//! and served by the server under `/covers`, or uploaded to a remote image hosting service.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt as _};
use tracing::debug;
use url::Url;

pub const COVERS_PATH: &str = "covers";

#[derive(Debug, thiserror::Error)]
pub enum CoverError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Upload failed: {0}")]
    UploadError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

type Result<T> = std::result::Result<T, CoverError>;

fn hex(bytes: &[u8]) -> String {
    base16ct::lower::encode_string(bytes)
}

#[derive(Debug, Clone)]
pub struct LocalCovers {
    dir: PathBuf,
    public_base: Url,
}

impl LocalCovers {
    /// `base_url` is public URL of the server
    pub fn new(dir: impl Into<PathBuf>, base_url: &Url) -> Result<Self> {
        let public_base = base_url.join(&format!("{COVERS_PATH}/"))?;
        Ok(Self {
            dir: dir.into(),
            public_base,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn store(&self, data: &[u8]) -> Result<Url> {
        let name = format!("{}.png", hex(&Sha256::digest(data)));
        let final_path = self.dir.join(&name);
        if !fs::try_exists(&final_path).await? {
            fs::create_dir_all(&self.dir).await?;
            let tmp_path = self
                .dir
                .join(format!(".{}.tmp", uuid::Uuid::new_v4()));
            write_atomically(&tmp_path, &final_path, data).await?;
            debug!("Stored cover {final_path:?}");
        }
        Ok(self.public_base.join(&name)?)
    }
}

/// Writes `data` to `tmp_path` and renames it to `final_path`, temporary file is removed on any failure
async fn write_atomically(
    tmp_path: &Path,
    final_path: &Path,
    data: &[u8],
) -> std::io::Result<()> {
    let res = async {
        let mut file = fs::File::create(tmp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);
        fs::rename(tmp_path, final_path).await
    }
    .await;
    if res.is_err() {
        let _ = fs::remove_file(tmp_path).await;
    }
    res
}

#[derive(Debug, Deserialize)]
struct RemoteUploadResponse {
    secure_url: Url,
}

#[derive(Debug, Clone)]
pub struct RemoteCovers {
    client: reqwest::Client,
    upload_url: Url,
}

impl RemoteCovers {
    pub fn new(upload_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url,
        }
    }

    async fn store(&self, data: &[u8]) -> Result<Url> {
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name("cover.png")
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response: RemoteUploadResponse = self
            .client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Cover uploaded to {}", response.secure_url);
        Ok(response.secure_url)
    }
}

/// Image host for covers, returns stable public URL of stored image
#[derive(Debug, Clone)]
pub enum CoverHost {
    Local(LocalCovers),
    Remote(RemoteCovers),
}

impl CoverHost {
    pub async fn store(&self, data: &[u8]) -> Result<Url> {
        match self {
            CoverHost::Local(local) => local.store(data).await,
            CoverHost::Remote(remote) => remote.store(data).await,
        }
    }

    /// Directory to serve, when covers are hosted locally
    pub fn local_dir(&self) -> Option<&Path> {
        match self {
            CoverHost::Local(local) => Some(local.dir()),
            CoverHost::Remote(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[tokio::test]
    #[traced_test]
    async fn test_local_store() {
        let tmp = tempfile::tempdir().unwrap();
        let base: Url = "http://localhost:3000/".parse().unwrap();
        let host = CoverHost::Local(LocalCovers::new(tmp.path().join("covers"), &base).unwrap());
        let data = b"not really png, but store does not care";

        let url = host.store(data).await.unwrap();
        assert!(url.as_str().starts_with("http://localhost:3000/covers/"));
        assert!(url.as_str().ends_with(".png"));
        let name = url.path_segments().unwrap().next_back().unwrap().to_string();
        let stored = std::fs::read(tmp.path().join("covers").join(&name)).unwrap();
        assert_eq!(stored, data);

        // same content, same URL
        let again = host.store(data).await.unwrap();
        assert_eq!(url, again);
        assert_eq!(host.local_dir(), Some(tmp.path().join("covers").as_path()));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_rename_leaves_no_tmp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let tmp_path = tmp.path().join(".cover.tmp");
        let final_path = tmp.path().join("missing").join("cover.png");

        let res = write_atomically(&tmp_path, &final_path, b"cover").await;
        assert!(res.is_err());
        assert!(!tmp_path.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);

        let final_path = tmp.path().join("cover.png");
        write_atomically(&tmp_path, &final_path, b"cover").await.unwrap();
        assert!(!tmp_path.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"cover");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_remote_failure() {
        // nothing listens on port 9 (discard) usually, request must fail
        let host = CoverHost::Remote(RemoteCovers::new(
            "http://127.0.0.1:9/upload".parse().unwrap(),
        ));
        assert!(matches!(
            host.store(b"data").await,
            Err(CoverError::UploadError(_))
        ));
    }
}
