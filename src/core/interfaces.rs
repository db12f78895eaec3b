use crate::core::models::OutputFragment;
use crate::core::stage::Stage;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;
    async fn modified(&self, path: &Path) -> Result<SystemTime>;
    async fn exists(&self, path: &Path) -> bool;
}

/// Options of a single pipeline run
#[derive(Clone)]
pub struct BundleOptions {
    pub cwd: PathBuf,
    pub dep_paths: Vec<PathBuf>,
    pub main_fields: Vec<String>,
    /// Stages running ahead of the built-in chain
    pub pre_stages: Vec<Arc<dyn Stage>>,
    /// Stages running after the built-in chain
    pub post_stages: Vec<Arc<dyn Stage>>,
}

impl BundleOptions {
    pub fn new(cwd: impl Into<PathBuf>, main_fields: Vec<String>) -> Self {
        Self {
            cwd: cwd.into(),
            dep_paths: Vec::new(),
            main_fields,
            pre_stages: Vec::new(),
            post_stages: Vec::new(),
        }
    }
}

impl std::fmt::Debug for BundleOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |stages: &[Arc<dyn Stage>]| {
            stages.iter().map(|s| s.name().to_string()).collect::<Vec<_>>()
        };
        f.debug_struct("BundleOptions")
            .field("cwd", &self.cwd)
            .field("dep_paths", &self.dep_paths)
            .field("main_fields", &self.main_fields)
            .field("pre_stages", &names(&self.pre_stages))
            .field("post_stages", &names(&self.post_stages))
            .finish()
    }
}

/// Turns an entry specifier into output fragments; the first fragment is
/// always the entry chunk.
#[async_trait]
pub trait BundleService: Send + Sync {
    async fn bundle(&self, specifier: &str, options: &BundleOptions) -> Result<Vec<OutputFragment>>;
}
