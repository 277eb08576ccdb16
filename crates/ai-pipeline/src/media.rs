//! Local media cache
//!
//! Videos are too large to inline as `data:` URLs, so their bytes are written
//! under the cache directory and addressed by `file://` URL.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MediaCache {
    root: PathBuf,
}

impl MediaCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the bytes (content-addressed) and return a displayable URL
    pub async fn store(&self, bytes: &[u8], mime_type: &str) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;

        let digest = Sha256::digest(bytes);
        let name = format!("{}.{}", hex::encode(&digest[..8]), extension_for(mime_type));
        let path = self.root.join(name);

        if tokio::fs::metadata(&path).await.is_err() {
            tokio::fs::write(&path, bytes).await?;
            tracing::debug!(path = %path.display(), size = bytes.len(), "cached media");
        }

        Ok(file_url(&path))
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/jpeg" | "image/jpg" => "jpg",
        _ => "bin",
    }
}

fn file_url(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}
