//! File copy collaborator.

use std::path::Path;

use splice_common::error::{SpliceError, SpliceResult};

/// Copies a finished file to its final location.
#[async_trait::async_trait]
pub trait FileCopier: Send + Sync {
    async fn copy(&self, src: &Path, dst: &Path) -> SpliceResult<()>;
}

/// Copies with `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCopier;

#[async_trait::async_trait]
impl FileCopier for FsCopier {
    async fn copy(&self, src: &Path, dst: &Path) -> SpliceResult<()> {
        if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SpliceError::copy(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let bytes = tokio::fs::copy(src, dst).await.map_err(|e| {
            SpliceError::copy(format!(
                "Failed to copy {} to {}: {e}",
                src.display(),
                dst.display()
            ))
        })?;
        tracing::debug!(src = %src.display(), dst = %dst.display(), bytes, "Copied file");
        Ok(())
    }
}
