use crate::core::models::{Resolution, ResolveContext, UnresolvedReason};
use crate::utils::{Logger, ModulesError, Result};
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extensions tried by `require.resolve`
pub const REQUIRE_EXTENSIONS: [&str; 3] = ["js", "json", "node"];

/// Extensions tried when resolving imports inside the bundling pipeline
pub const BUNDLE_EXTENSIONS: [&str; 4] = ["mjs", "js", "json", "node"];

/// Parsed package.json; fields stay untyped so any main field can be queried
#[derive(Debug, Clone)]
pub struct PackageManifest {
    pub path: PathBuf,
    raw: Value,
}

impl PackageManifest {
    pub fn from_str(path: &Path, content: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(content)?;
        if !raw.is_object() {
            return Err(ModulesError::parse(format!(
                "{} does not contain a JSON object",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            raw,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.field_str("name")
    }

    /// String value of a top-level field; objects and arrays yield `None`
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.raw.get(field).and_then(Value::as_str)
    }

    pub fn exports(&self) -> Option<&Value> {
        self.raw.get("exports").filter(|v| !v.is_null())
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Flavour of standard package resolution
#[derive(Debug, Clone)]
pub struct LookupMode {
    pub main_fields: Vec<String>,
    pub conditions: Vec<String>,
    pub extensions: &'static [&'static str],
}

impl LookupMode {
    /// Node's `require.resolve`
    pub fn require() -> Self {
        Self {
            main_fields: vec!["main".to_string()],
            conditions: vec!["require".to_string(), "node".to_string()],
            extensions: &REQUIRE_EXTENSIONS,
        }
    }

    /// Browser-oriented lookup honouring the given manifest field order
    pub fn bundle(main_fields: &[String]) -> Self {
        let mut conditions = Vec::new();
        if main_fields.iter().any(|f| f == "browser") {
            conditions.push("browser".to_string());
        }
        conditions.extend(["import".to_string(), "module".to_string()]);
        Self {
            main_fields: main_fields.to_vec(),
            conditions,
            extensions: &BUNDLE_EXTENSIONS,
        }
    }
}

/// node_modules lookup with a manifest cache
#[derive(Debug, Default)]
pub struct PackageLookup {
    manifests: DashMap<PathBuf, Arc<PackageManifest>>,
}

impl PackageLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and cache a package.json
    pub fn read_manifest(&self, path: &Path) -> Result<Arc<PackageManifest>> {
        if let Some(cached) = self.manifests.get(path) {
            return Ok(cached.clone());
        }

        let content = std::fs::read_to_string(path)?;
        let manifest = Arc::new(PackageManifest::from_str(path, &content)?);
        self.manifests.insert(path.to_path_buf(), manifest.clone());
        Ok(manifest)
    }

    /// Resolve a bare specifier from each root in turn
    pub fn resolve(&self, specifier: &str, roots: &[PathBuf], mode: &LookupMode) -> Option<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(specifier);

        for root in roots {
            for node_modules in node_modules_paths(root) {
                let package_dir = node_modules.join(&package_name);
                if !package_dir.is_dir() {
                    continue;
                }
                if let Some(found) = self.resolve_in_package(&package_dir, subpath.as_deref(), mode) {
                    return Some(realpath(found));
                }
            }
        }

        None
    }

    /// Resolve a relative request against the directory of the importer
    pub fn resolve_relative(&self, base_dir: &Path, request: &str, mode: &LookupMode) -> Option<PathBuf> {
        let target = normalize(&base_dir.join(request));
        self.load_as_file(&target, mode)
            .or_else(|| self.load_as_directory(&target, mode))
            .map(realpath)
    }

    fn resolve_in_package(
        &self,
        package_dir: &Path,
        subpath: Option<&str>,
        mode: &LookupMode,
    ) -> Option<PathBuf> {
        let manifest = self.read_manifest(&package_dir.join("package.json")).ok();

        // the manifest itself stays reachable even when `exports` hides it
        let manifest_request =
            subpath.is_some_and(|s| s == "package.json" || s.ends_with("/package.json"));

        if let (Some(manifest), false) = (&manifest, manifest_request) {
            if let Some(exports) = manifest.exports() {
                let key = match subpath {
                    Some(sub) => format!("./{}", sub),
                    None => ".".to_string(),
                };
                return resolve_exports(exports, &key, &mode.conditions)
                    .map(|target| normalize(&package_dir.join(target.trim_start_matches("./"))))
                    .filter(|path| path.is_file());
            }
        }

        match subpath {
            Some(sub) => {
                let target = package_dir.join(sub);
                self.load_as_file(&target, mode)
                    .or_else(|| self.load_as_directory(&target, mode))
            }
            None => self.load_as_directory(package_dir, mode),
        }
    }

    pub fn load_as_file(&self, path: &Path, mode: &LookupMode) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        mode.extensions
            .iter()
            .map(|ext| append_extension(path, ext))
            .find(|candidate| candidate.is_file())
    }

    fn load_index(&self, dir: &Path, mode: &LookupMode) -> Option<PathBuf> {
        mode.extensions
            .iter()
            .map(|ext| dir.join(format!("index.{}", ext)))
            .find(|candidate| candidate.is_file())
    }

    pub fn load_as_directory(&self, dir: &Path, mode: &LookupMode) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }

        if let Ok(manifest) = self.read_manifest(&dir.join("package.json")) {
            for field in &mode.main_fields {
                if let Some(entry) = manifest.field_str(field) {
                    let target = normalize(&dir.join(entry));
                    if let Some(found) = self
                        .load_as_file(&target, mode)
                        .or_else(|| self.load_index(&target, mode))
                    {
                        return Some(found);
                    }
                }
            }
        }

        self.load_index(dir, mode)
    }
}

/// Resolves bare module specifiers to files on disk
///
/// Holds the negative resolution set: a specifier that could not be resolved
/// once is never looked up again until [`ModuleResolver::forget`] or
/// [`ModuleResolver::clear_negative_cache`] is called.
pub struct ModuleResolver {
    lookup: PackageLookup,
    negative: DashSet<String>,
    default_root: PathBuf,
    lookups: AtomicUsize,
}

impl ModuleResolver {
    pub fn new() -> Self {
        let default_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_default_root(default_root)
    }

    /// Root of the last-resort lookup (defaults to the process working directory)
    pub fn with_default_root(default_root: impl Into<PathBuf>) -> Self {
        Self {
            lookup: PackageLookup::new(),
            negative: DashSet::new(),
            default_root: default_root.into(),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn package_lookup(&self) -> &PackageLookup {
        &self.lookup
    }

    /// Number of resolutions that went past the negative cache
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn is_known_missing(&self, specifier: &str) -> bool {
        self.negative.contains(specifier)
    }

    pub fn forget(&self, specifier: &str) -> bool {
        self.negative.remove(specifier).is_some()
    }

    pub fn clear_negative_cache(&self) {
        self.negative.clear();
    }

    pub fn resolve(&self, specifier: &str, context: &ResolveContext) -> Resolution {
        if specifier.starts_with('.') {
            return Resolution::Unresolved(UnresolvedReason::Relative);
        }
        if self.negative.contains(specifier) {
            return Resolution::Unresolved(UnresolvedReason::KnownMissing);
        }

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let main_fields = context.main_fields();
        Logger::resolving(specifier, &main_fields);

        // app-local resources are addressed by the app's package name
        match self.lookup.read_manifest(&context.cwd.join("package.json")) {
            Ok(app) => {
                if let Some(local) = app.name().and_then(|name| {
                    specifier
                        .strip_prefix(name)
                        .and_then(|rest| rest.strip_prefix('/'))
                }) {
                    let path = context.cwd.join(format!("{}.js", local));
                    debug!("  => app-local resource {}", path.display());
                    return Resolution::Found(path);
                }
            }
            Err(ModulesError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No package.json in {}", context.cwd.display());
            }
            Err(e) => {
                warn!("Failed to read package.json of {}: {}", context.cwd.display(), e);
                return Resolution::Failed(e.to_string());
            }
        }

        let resolved = self
            .resolve_from_manifest_fields(specifier, context, &main_fields)
            .or_else(|| self.resolve_standard(specifier, context));

        match resolved {
            Some(path) => {
                Logger::resolved(&path);
                Resolution::Found(path)
            }
            None => {
                self.negative.insert(specifier.to_string());
                Logger::not_resolved();
                Resolution::Unresolved(UnresolvedReason::NotFound)
            }
        }
    }

    /// Entry derived from the first string-valued manifest field
    fn resolve_from_manifest_fields(
        &self,
        specifier: &str,
        context: &ResolveContext,
        main_fields: &[String],
    ) -> Option<PathBuf> {
        let manifest_request = format!("{}/package.json", specifier);
        let manifest_path = self.resolve_standard(&manifest_request, context)?;
        let manifest = match self.lookup.read_manifest(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!("Ignoring unreadable manifest {}: {}", manifest_path.display(), e);
                return None;
            }
        };

        let (field, value) = main_fields
            .iter()
            .find_map(|field| manifest.field_str(field).map(|value| (field, value)))?;
        let candidate = normalize(&manifest.dir().join(value));
        if candidate.exists() {
            debug!("  => using \"{}\" field of {}", field, manifest_path.display());
            Some(candidate)
        } else {
            debug!(
                "  => \"{}\" field of {} points to missing {}",
                field,
                manifest_path.display(),
                candidate.display()
            );
            None
        }
    }

    /// `require.resolve` with the context roots, then the default root
    fn resolve_standard(&self, request: &str, context: &ResolveContext) -> Option<PathBuf> {
        let mode = LookupMode::require();
        self.lookup
            .resolve(request, &context.search_roots(), &mode)
            .or_else(|| {
                self.lookup
                    .resolve(request, std::slice::from_ref(&self.default_root), &mode)
            })
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a bare specifier into package name and optional subpath
pub fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    let mut segments = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name = if specifier.starts_with('@') {
        match (segments.next(), segments.next()) {
            (Some(scope), Some(name)) => format!("{}/{}", scope, name),
            (Some(scope), None) => scope.to_string(),
            _ => specifier.to_string(),
        }
    } else {
        segments.next().unwrap_or(specifier).to_string()
    };
    let subpath = segments.next().filter(|s| !s.is_empty()).map(str::to_string);
    (name, subpath)
}

/// `node_modules` directories from `start` up to the filesystem root
pub fn node_modules_paths(start: &Path) -> Vec<PathBuf> {
    start
        .ancestors()
        .filter(|dir| dir.file_name().map_or(true, |name| name != "node_modules"))
        .map(|dir| dir.join("node_modules"))
        .collect()
}

/// Match a subpath (`.` or `./x`) against a package `exports` field
pub fn resolve_exports(exports: &Value, subpath: &str, conditions: &[String]) -> Option<String> {
    let map = match exports {
        Value::Object(map) if map.keys().any(|k| k.starts_with('.')) => map,
        // sugar: the whole value is the "." target
        other => {
            return if subpath == "." {
                resolve_export_target(other, conditions, None)
            } else {
                None
            };
        }
    };

    if let Some(target) = map.get(subpath) {
        return resolve_export_target(target, conditions, None);
    }

    // longest matching "./prefix*suffix" pattern wins
    map.iter()
        .filter_map(|(key, target)| {
            let (prefix, suffix) = key.split_once('*')?;
            let rest = subpath.strip_prefix(prefix)?;
            let matched = rest.strip_suffix(suffix)?;
            Some((prefix.len(), matched, target))
        })
        .max_by_key(|(prefix_len, _, _)| *prefix_len)
        .and_then(|(_, matched, target)| resolve_export_target(target, conditions, Some(matched)))
}

fn resolve_export_target(target: &Value, conditions: &[String], wildcard: Option<&str>) -> Option<String> {
    match target {
        Value::String(path) => Some(match wildcard {
            Some(matched) => path.replace('*', matched),
            None => path.clone(),
        }),
        Value::Array(items) => items
            .iter()
            .find_map(|item| resolve_export_target(item, conditions, wildcard)),
        Value::Object(branches) => branches.iter().find_map(|(condition, branch)| {
            if condition == "default" || conditions.iter().any(|c| c == condition) {
                resolve_export_target(branch, conditions, wildcard)
            } else {
                None
            }
        }),
        _ => None,
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Lexically drop `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve symlinks so pnpm's virtual store paths become the real location
fn realpath(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}
