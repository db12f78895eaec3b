use crate::core::interfaces::{BundleOptions, BundleService, FileSystemService};
use crate::core::models::*;
use crate::core::stage::Stage;
use crate::infrastructure::{ModuleClassifier, ModuleResolver, PipelineBundler};
use crate::stages::{DynamicImportsStage, LoggerStage};
use crate::utils::{Logger, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Serves npm modules as loader-ready code
///
/// Owns the output cache keyed by module name and the index mapping split
/// chunks back to the entry file that produced them.
pub struct ResourceService {
    resolver: Arc<ModuleResolver>,
    fs: Arc<dyn FileSystemService>,
    classifier: ModuleClassifier,
    bundler: Arc<dyn BundleService>,
    cache: DashMap<String, Arc<CacheEntry>>,
    chunk_index: DashMap<String, PathBuf>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl ResourceService {
    pub fn new(resolver: Arc<ModuleResolver>, fs: Arc<dyn FileSystemService>) -> Self {
        let bundler = Arc::new(PipelineBundler::new(resolver.clone(), fs.clone()));
        Self {
            classifier: ModuleClassifier::new(fs.clone()),
            resolver,
            fs,
            bundler,
            cache: DashMap::new(),
            chunk_index: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Replace the bundling pipeline
    pub fn with_bundler(mut self, bundler: Arc<dyn BundleService>) -> Self {
        self.bundler = bundler;
        self
    }

    pub fn resolver(&self) -> &Arc<ModuleResolver> {
        &self.resolver
    }

    pub fn cached(&self, specifier: &str) -> Option<Arc<CacheEntry>> {
        self.cache.get(specifier).map(|entry| entry.value().clone())
    }

    /// Entry file a chunk was produced from
    pub fn chunk_origin(&self, specifier: &str) -> Option<PathBuf> {
        self.chunk_index.get(specifier).map(|entry| entry.value().clone())
    }

    /// Drop all cached output and chunk registrations
    pub fn clear(&self) {
        self.cache.clear();
        self.chunk_index.clear();
    }

    /// Code for `specifier`: bundled, passed through, or served from cache
    ///
    /// Returns `None` when the module cannot be resolved and nothing is cached,
    /// when the resolved file is gone, or when bundling fails twice.
    pub async fn get_resource(
        &self,
        specifier: &str,
        config: &ResourceConfig,
        options: &ResourceOptions,
    ) -> Option<Arc<CacheEntry>> {
        let (path, is_chunk) = match self.chunk_origin(specifier) {
            Some(path) => (path, true),
            None => match self.resolver.resolve(specifier, &options.resolve_context()) {
                Resolution::Found(path) => (path, false),
                Resolution::Failed(message) => {
                    warn!("Resolving {} failed: {}", specifier, message);
                    return self.cached(specifier);
                }
                Resolution::Unresolved(_) => return self.cached(specifier),
            },
        };

        if !self.fs.exists(&path).await {
            error!(
                "Bundle {} doesn't exist at the resolved path {}!",
                specifier,
                path.display()
            );
            return None;
        }

        if is_chunk {
            return self.cached(specifier);
        }

        let lock = self
            .in_flight
            .entry(specifier.to_string())
            .or_default()
            .value()
            .clone();
        let entry = {
            let _guard = lock.lock().await;
            self.load_resource(specifier, &path, config, options).await
        };
        // the map and `lock` are the only holders once no other request waits
        self.in_flight
            .remove_if(specifier, |_, held| Arc::strong_count(held) == 2);
        entry
    }

    /// Cache check and rebuild, run under the specifier's in-flight lock
    async fn load_resource(
        &self,
        specifier: &str,
        path: &Path,
        config: &ResourceConfig,
        options: &ResourceOptions,
    ) -> Option<Arc<CacheEntry>> {
        let last_modified = match self.fs.modified(path).await {
            Ok(modified) => modified,
            Err(e) => {
                error!("Couldn't read the modification time of {}: {}", path.display(), e);
                return None;
            }
        };

        if let Some(cached) = self.cached(specifier) {
            if !config.skip_cache && cached.last_modified == last_modified {
                debug!("Serving {} from cache", specifier);
                return Some(cached);
            }
        }

        if !self.needs_bundling(specifier, path, options).await {
            return self.passthrough(specifier, path, last_modified).await;
        }

        match self.bundle_with_fallback(specifier, config, options).await {
            Ok(fragments) => self.store_bundle(specifier, path, last_modified, fragments, config),
            Err(e) => {
                error!("Couldn't bundle {}: {}", specifier, e.format_detailed());
                None
            }
        }
    }

    /// Only non-native `.js`, `.mjs` and `.cjs` sources go through the pipeline
    async fn needs_bundling(&self, specifier: &str, path: &Path, options: &ResourceOptions) -> bool {
        if options.skip_transform.applies_to(specifier) {
            debug!("Skipping transformation of {}", specifier);
            return false;
        }

        let script = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext.as_str()));
        if !script {
            return false;
        }

        !self.classifier.is_native_module(path).await
    }

    async fn passthrough(
        &self,
        specifier: &str,
        path: &Path,
        last_modified: SystemTime,
    ) -> Option<Arc<CacheEntry>> {
        match self.fs.read_file(path).await {
            Ok(code) => {
                let entry = Arc::new(CacheEntry::passthrough(code, last_modified, path.to_path_buf()));
                self.cache.insert(specifier.to_string(), entry.clone());
                Some(entry)
            }
            Err(e) => {
                error!("Couldn't read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// ES module field order first, then once more preferring CommonJS entries
    async fn bundle_with_fallback(
        &self,
        specifier: &str,
        config: &ResourceConfig,
        options: &ResourceOptions,
    ) -> Result<Vec<OutputFragment>> {
        let primary = self.bundle_options(specifier, config, options, default_main_fields());
        match self.bundler.bundle(specifier, &primary).await {
            Ok(fragments) => Ok(fragments),
            Err(e) => {
                warn!(
                    "Failed to bundle \"{}\" using ES modules, falling back to CommonJS modules...",
                    specifier
                );
                debug!("{}", e.format_detailed());
                let fallback = self.bundle_options(specifier, config, options, fallback_main_fields());
                self.bundler.bundle(specifier, &fallback).await
            }
        }
    }

    fn bundle_options(
        &self,
        specifier: &str,
        config: &ResourceConfig,
        options: &ResourceOptions,
        main_fields: Vec<String>,
    ) -> BundleOptions {
        let mut bundle = BundleOptions::new(options.cwd.clone(), main_fields);
        bundle.dep_paths = options.dep_paths.clone();
        bundle.pre_stages = vec![Arc::new(LoggerStage) as Arc<dyn Stage>];
        bundle.post_stages = vec![Arc::new(DynamicImportsStage::new(
            specifier,
            config.keep_dynamic_imports.clone(),
        )) as Arc<dyn Stage>];
        bundle
    }

    fn store_bundle(
        &self,
        specifier: &str,
        path: &Path,
        last_modified: SystemTime,
        fragments: Vec<OutputFragment>,
        config: &ResourceConfig,
    ) -> Option<Arc<CacheEntry>> {
        let mut fragments = fragments.into_iter();
        let Some(primary) = fragments.next() else {
            error!("Couldn't bundle {}: no output produced", specifier);
            return None;
        };
        let mut entry = CacheEntry::bundled(primary.contents().to_string(), last_modified);

        let extra: Vec<OutputFragment> = fragments.collect();
        if !extra.is_empty() {
            if config.debug {
                Logger::bundle_chunks(specifier, extra.len() + 1);
            } else {
                debug!("The bundle for {} has {} chunks!", specifier, extra.len() + 1);
            }

            // registrations of the previous build of this file are stale
            self.chunk_index.retain(|_, origin| origin.as_path() != path);

            for fragment in extra {
                if fragment.contents().is_empty() {
                    continue;
                }
                let name = fragment.specifier().to_string();
                let chunk = Arc::new(CacheEntry::bundled(
                    fragment.contents().to_string(),
                    last_modified,
                ));
                self.cache.insert(name.clone(), chunk.clone());
                self.chunk_index.insert(name.clone(), path.to_path_buf());
                entry.chunks.insert(name, chunk);
            }
        }

        let entry = Arc::new(entry);
        self.cache.insert(specifier.to_string(), entry.clone());
        Some(entry)
    }
}
