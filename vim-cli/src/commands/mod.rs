pub mod inspect;
pub mod node;
pub mod tables;

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Reads `path` and runs `decode` over its bytes on the blocking pool.
pub async fn with_file<T, F>(path: PathBuf, decode: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Path, &[u8]) -> anyhow::Result<T> + Send + 'static,
{
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    log::debug!("read {} bytes from {}", bytes.len(), path.display());

    tokio::task::spawn_blocking(move || decode(&path, &bytes)).await?
}
