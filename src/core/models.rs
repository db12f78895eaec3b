use crate::utils::matches_any;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Manifest field order used for the first bundling attempt
pub const DEFAULT_MAIN_FIELDS: [&str; 3] = ["browser", "module", "main"];

/// Field order for the retry: CommonJS `main` before the ES `module` entry
pub const FALLBACK_MAIN_FIELDS: [&str; 3] = ["browser", "main", "module"];

/// File extensions the pipeline accepts as JavaScript sources
pub const SCRIPT_EXTENSIONS: [&str; 3] = ["js", "mjs", "cjs"];

pub fn default_main_fields() -> Vec<String> {
    DEFAULT_MAIN_FIELDS.iter().map(|f| f.to_string()).collect()
}

pub fn fallback_main_fields() -> Vec<String> {
    FALLBACK_MAIN_FIELDS.iter().map(|f| f.to_string()).collect()
}

/// Where and how to look for packages
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// Root of the consuming project (holds its package.json)
    pub cwd: PathBuf,
    /// Additional roots for package lookup (pnpm / monorepo layouts)
    pub dep_paths: Vec<PathBuf>,
    /// Manifest fields in priority order; `None` means [`DEFAULT_MAIN_FIELDS`]
    pub main_fields: Option<Vec<String>>,
}

impl ResolveContext {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            dep_paths: Vec::new(),
            main_fields: None,
        }
    }

    pub fn with_dep_paths(mut self, dep_paths: Vec<PathBuf>) -> Self {
        self.dep_paths = dep_paths;
        self
    }

    pub fn with_main_fields(mut self, main_fields: Vec<String>) -> Self {
        self.main_fields = Some(main_fields);
        self
    }

    pub fn main_fields(&self) -> Vec<String> {
        self.main_fields.clone().unwrap_or_else(default_main_fields)
    }

    /// Search roots for standard package resolution: cwd first, then dep paths
    pub fn search_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::with_capacity(self.dep_paths.len() + 1);
        roots.push(self.cwd.clone());
        roots.extend(self.dep_paths.iter().cloned());
        roots
    }
}

/// Why a specifier could not be mapped to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// Relative specifiers are never resolved by name
    Relative,
    /// Listed in the negative resolution set, no lookup happened
    KnownMissing,
    /// Every strategy was tried without success
    NotFound,
}

/// Outcome of [`crate::infrastructure::ModuleResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    Unresolved(UnresolvedReason),
    /// The consuming project's manifest could not be read or parsed
    Failed(String),
}

impl Resolution {
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Resolution::Found(path) => Some(path),
            _ => None,
        }
    }
}

/// Boolean-or-globs switch used by `skipTransform`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkipTransform {
    All(bool),
    Globs(Vec<String>),
}

impl Default for SkipTransform {
    fn default() -> Self {
        SkipTransform::All(false)
    }
}

impl SkipTransform {
    pub fn applies_to(&self, specifier: &str) -> bool {
        match self {
            SkipTransform::All(flag) => *flag,
            SkipTransform::Globs(globs) => matches_any(globs, specifier),
        }
    }
}

/// Boolean-or-package-list switch used by `keepDynamicImports`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeepDynamicImports {
    All(bool),
    Packages(Vec<String>),
}

impl Default for KeepDynamicImports {
    fn default() -> Self {
        KeepDynamicImports::All(true)
    }
}

impl KeepDynamicImports {
    /// Whether dynamic imports inside the bundle of `specifier` stay separate
    pub fn applies_to(&self, specifier: &str) -> bool {
        match self {
            KeepDynamicImports::All(flag) => *flag,
            KeepDynamicImports::Packages(packages) => packages.iter().any(|package| {
                specifier == package
                    || specifier
                        .strip_prefix(package.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }),
        }
    }
}

/// Cache-control switches of a resource request
#[derive(Debug, Clone, Default)]
pub struct ResourceConfig {
    pub skip_cache: bool,
    /// Forces extra diagnostics (chunk counts) at info level
    pub debug: bool,
    pub keep_dynamic_imports: KeepDynamicImports,
}

/// Resolution side of a resource request
#[derive(Debug, Clone)]
pub struct ResourceOptions {
    pub cwd: PathBuf,
    pub dep_paths: Vec<PathBuf>,
    pub skip_transform: SkipTransform,
}

impl ResourceOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            dep_paths: Vec::new(),
            skip_transform: SkipTransform::default(),
        }
    }

    pub fn resolve_context(&self) -> ResolveContext {
        ResolveContext::new(self.cwd.clone()).with_dep_paths(self.dep_paths.clone())
    }
}

/// Options of the resource lister
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub cwd: PathBuf,
    pub dep_paths: Vec<PathBuf>,
    pub ignore: Vec<String>,
}

impl ListOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            dep_paths: Vec::new(),
            ignore: Vec::new(),
        }
    }
}

/// Cached output of a resource request
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub code: String,
    /// Modification time of the source the entry was produced from
    pub last_modified: SystemTime,
    /// Only set for passthrough entries
    pub path: Option<PathBuf>,
    /// Split fragments of a bundled entry, keyed by their specifier
    pub chunks: BTreeMap<String, Arc<CacheEntry>>,
}

impl CacheEntry {
    pub fn bundled(code: String, last_modified: SystemTime) -> Self {
        Self {
            code,
            last_modified,
            path: None,
            chunks: BTreeMap::new(),
        }
    }

    pub fn passthrough(code: String, last_modified: SystemTime, path: PathBuf) -> Self {
        Self {
            code,
            last_modified,
            path: Some(path),
            chunks: BTreeMap::new(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.path.is_some()
    }
}

/// One output file of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFragment {
    Chunk {
        file_name: String,
        code: String,
        is_entry: bool,
    },
    Asset {
        file_name: String,
        source: String,
    },
}

impl OutputFragment {
    pub fn file_name(&self) -> &str {
        match self {
            OutputFragment::Chunk { file_name, .. } | OutputFragment::Asset { file_name, .. } => {
                file_name
            }
        }
    }

    /// Code of a chunk or source of an asset
    pub fn contents(&self) -> &str {
        match self {
            OutputFragment::Chunk { code, .. } => code,
            OutputFragment::Asset { source, .. } => source,
        }
    }

    /// Specifier a fragment is served under: chunks drop their `.js`
    /// extension, assets keep the full file name.
    pub fn specifier(&self) -> &str {
        match self {
            OutputFragment::Chunk { file_name, .. } => {
                file_name.strip_suffix(".js").unwrap_or(file_name)
            }
            OutputFragment::Asset { file_name, .. } => file_name,
        }
    }
}
