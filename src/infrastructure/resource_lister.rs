use crate::core::models::{ListOptions, Resolution, ResolveContext};
use crate::infrastructure::node_resolver::ModuleResolver;
use crate::utils::{GlobList, ModulesError, Result, MINIMATCH_OPTIONS};
use glob::Pattern;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Per-directory ignore files, evaluated with gitignore rules
pub const IGNORE_FILES: [&str; 2] = [".ignore", ".gitignore"];

#[derive(Debug, Clone)]
struct IgnoreRule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    /// Patterns with an inner slash match the path relative to the ignore
    /// file; others match the file name at any depth
    anchored: bool,
}

#[derive(Debug, Clone, Default)]
struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    fn parse(content: &str) -> Self {
        let rules = content
            .lines()
            .filter_map(|line| {
                let line = line.trim_end();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }

                let (negated, line) = match line.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, line.strip_prefix('\\').unwrap_or(line)),
                };
                let (dir_only, line) = match line.strip_suffix('/') {
                    Some(rest) => (true, rest),
                    None => (false, line),
                };
                let anchored = line.contains('/');
                let line = line.strip_prefix('/').unwrap_or(line);

                match Pattern::new(line) {
                    Ok(pattern) => Some(IgnoreRule {
                        pattern,
                        negated,
                        dir_only,
                        anchored,
                    }),
                    Err(e) => {
                        warn!("Skipping invalid ignore rule \"{}\": {}", line, e);
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    /// `Some(true)` if ignored, `Some(false)` if re-included, `None` if no rule applies
    fn decision(&self, relative: &str, is_dir: bool) -> Option<bool> {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        self.rules
            .iter()
            .rev()
            .find(|rule| {
                if rule.dir_only && !is_dir {
                    return false;
                }
                let subject = if rule.anchored { relative } else { name };
                rule.pattern.matches_with(subject, MINIMATCH_OPTIONS)
            })
            .map(|rule| !rule.negated)
    }
}

/// Walks `root` and returns the sorted, `/`-separated paths of all files
/// not excluded by ignore files
pub fn walk_package(root: &Path) -> Result<Vec<String>> {
    let mut rules: HashMap<PathBuf, IgnoreRules> = HashMap::new();
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            !is_ignored(root, entry.path(), entry.file_type().is_dir(), &mut rules)
        });

    for entry in walker {
        let entry = entry.map_err(|e| ModulesError::Io(e.into()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(to_slash(relative));
        }
    }

    files.sort();
    Ok(files)
}

fn is_ignored(root: &Path, path: &Path, is_dir: bool, cache: &mut HashMap<PathBuf, IgnoreRules>) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    let Ok(relative_parent) = parent.strip_prefix(root) else {
        return false;
    };

    // root first so deeper ignore files override
    let mut dirs = vec![root.to_path_buf()];
    let mut current = root.to_path_buf();
    for component in relative_parent.components() {
        current.push(component);
        dirs.push(current.clone());
    }

    let mut ignored = false;
    for dir in dirs {
        let rules = cache.entry(dir.clone()).or_insert_with(|| load_rules(&dir));
        let Ok(relative) = path.strip_prefix(&dir) else {
            continue;
        };
        if let Some(decision) = rules.decision(&to_slash(relative), is_dir) {
            ignored = decision;
        }
    }
    ignored
}

fn load_rules(dir: &Path) -> IgnoreRules {
    let mut combined = IgnoreRules::default();
    for file in IGNORE_FILES {
        if let Ok(content) = std::fs::read_to_string(dir.join(file)) {
            debug!("Applying {}", dir.join(file).display());
            combined.rules.extend(IgnoreRules::parse(&content).rules);
        }
    }
    combined
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Enumerates the files of an installed npm package
pub struct ResourceLister {
    resolver: Arc<ModuleResolver>,
}

impl ResourceLister {
    pub fn new(resolver: Arc<ModuleResolver>) -> Self {
        Self { resolver }
    }

    /// `<package>/<relative path>` for every file of the package that is
    /// neither excluded by its ignore files nor matched by `options.ignore`
    pub fn list_resources(&self, package: &str, options: &ListOptions) -> Result<Vec<String>> {
        let context = ResolveContext::new(options.cwd.clone()).with_dep_paths(options.dep_paths.clone());
        let manifest = match self.resolver.resolve(&format!("{}/package.json", package), &context) {
            Resolution::Found(path) => path,
            _ => return Err(ModulesError::PackageNotFound(package.to_string())),
        };

        let root = manifest
            .parent()
            .ok_or_else(|| ModulesError::PackageNotFound(package.to_string()))?;
        let ignore = GlobList::new(&options.ignore);

        let resources = walk_package(root)?
            .into_iter()
            .filter(|file| !ignore.is_match(file))
            .map(|file| format!("{}/{}", package, file))
            .collect();
        Ok(resources)
    }
}
