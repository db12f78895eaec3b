use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use ui5_modules::core::interfaces::{BundleOptions, BundleService};
use ui5_modules::core::models::{OutputFragment, DEFAULT_MAIN_FIELDS};
use ui5_modules::infrastructure::{ModuleResolver, TokioFileSystemService};
use ui5_modules::utils::{ModulesError, Result};
use ui5_modules::ResourceService;

/// A consuming project in a temp dir with its own node_modules
pub struct Project {
    _dir: TempDir,
    pub root: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        // canonical so paths compare equal to resolved realpaths
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("package.json"), r#"{ "name": "app", "version": "1.0.0" }"#).unwrap();
        Self { _dir: dir, root }
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    /// `node_modules/<name>` with the given manifest and files
    pub fn package(&self, name: &str, manifest: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.root.join("node_modules").join(name);
        self.write(&format!("node_modules/{}/package.json", name), manifest);
        for (file, content) in files {
            self.write(&format!("node_modules/{}/{}", name, file), content);
        }
        dir
    }

    pub fn resolver(&self) -> Arc<ModuleResolver> {
        Arc::new(ModuleResolver::with_default_root(&self.root))
    }

    pub fn service(&self, bundler: Arc<dyn BundleService>) -> (ResourceService, Arc<ModuleResolver>) {
        let resolver = self.resolver();
        let service = ResourceService::new(resolver.clone(), Arc::new(TokioFileSystemService))
            .with_bundler(bundler);
        (service, resolver)
    }
}

/// Move the modification time of `path` forward
pub fn touch_later(path: &Path, seconds: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    let current = file.metadata().unwrap().modified().unwrap_or(SystemTime::now());
    file.set_modified(current + Duration::from_secs(seconds)).unwrap();
}

/// Bundler double that records every call
///
/// Fails whenever the first bundling attempt's field order is used and
/// `fail_primary` is set, and on every call when `fail_always` is set; emits `chunks` extra fragments per call with names
/// that change on every build.
#[derive(Default)]
pub struct CountingBundler {
    pub calls: AtomicUsize,
    pub main_fields: Mutex<Vec<Vec<String>>>,
    pub fail_primary: bool,
    pub fail_always: bool,
    pub chunks: usize,
}

impl CountingBundler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_primary() -> Arc<Self> {
        Arc::new(Self {
            fail_primary: true,
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_always: true,
            ..Self::default()
        })
    }

    pub fn with_chunks(chunks: usize) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn render(specifier: &str, main_fields: &[String]) -> String {
        format!(
            "sap.ui.define([], function () {{ return \"{} [{}]\"; }});",
            specifier,
            main_fields.join(",")
        )
    }
}

#[async_trait]
impl BundleService for CountingBundler {
    async fn bundle(&self, specifier: &str, options: &BundleOptions) -> Result<Vec<OutputFragment>> {
        let build = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.main_fields.lock().push(options.main_fields.clone());

        if self.fail_primary && options.main_fields == DEFAULT_MAIN_FIELDS {
            return Err(ModulesError::build("ES module entry is broken"));
        }
        if self.fail_always {
            return Err(ModulesError::build("every entry is broken"));
        }

        let mut fragments = vec![OutputFragment::Chunk {
            file_name: format!("{}.js", specifier),
            code: Self::render(specifier, &options.main_fields),
            is_entry: true,
        }];
        for n in 0..self.chunks {
            fragments.push(OutputFragment::Chunk {
                file_name: format!("{}-{:04x}{:04x}.js", specifier, build, n),
                code: format!("sap.ui.define([], function () {{ return {}; }});", n),
                is_entry: false,
            });
        }
        Ok(fragments)
    }
}
