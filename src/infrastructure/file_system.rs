use crate::core::interfaces::FileSystemService;
use crate::utils::{ModulesError, Result};
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;

pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(ModulesError::Io)
    }

    async fn modified(&self, path: &Path) -> Result<SystemTime> {
        let metadata = fs::metadata(path).await.map_err(ModulesError::Io)?;
        metadata.modified().map_err(ModulesError::Io)
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}
