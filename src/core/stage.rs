// Transformation stage contract for the bundling pipeline
// Stages hook into resolution, loading, transformation and dynamic import handling

use crate::utils::{ModulesError, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Warning categories that are expected for npm code and never reported
pub const SUPPRESSED_WARNINGS: [&str; 4] = [
    "THIS_IS_UNDEFINED",
    "CIRCULAR_DEPENDENCY",
    "MIXED_EXPORTS",
    "MODULE_LEVEL_DIRECTIVE",
];

/// Prefix of module ids that do not live on disk
pub const VIRTUAL_PREFIX: char = '\0';

pub fn is_virtual(id: &str) -> bool {
    id.starts_with(VIRTUAL_PREFIX)
}

/// True for ids whose code is JavaScript (not JSON or other assets)
pub fn is_script_id(id: &str) -> bool {
    if is_virtual(id) {
        return true;
    }
    let lower = id.to_ascii_lowercase();
    !lower.ends_with(".json") && !lower.ends_with(".css")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

/// Warning raised while building the module graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub loc: Option<DiagnosticLocation>,
    pub frame: Option<String>,
}

impl Diagnostic {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            loc: None,
            frame: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: usize, column: usize) -> Self {
        self.loc = Some(DiagnosticLocation {
            file: file.into(),
            line,
            column,
        });
        self
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }

    pub fn is_suppressed(&self) -> bool {
        SUPPRESSED_WARNINGS.contains(&self.code.as_str())
    }
}

/// Context shared by all stages of one pipeline run
#[derive(Debug)]
pub struct StageContext {
    pub cwd: PathBuf,
    pub dep_paths: Vec<PathBuf>,
    pub main_fields: Vec<String>,
    /// Entry specifier of the run
    pub entry: String,
    reported: Mutex<Vec<Diagnostic>>,
}

impl StageContext {
    pub fn new(entry: &str, cwd: PathBuf, dep_paths: Vec<PathBuf>, main_fields: Vec<String>) -> Self {
        Self {
            cwd,
            dep_paths,
            main_fields,
            entry: entry.to_string(),
            reported: Mutex::new(Vec::new()),
        }
    }

    /// Report a warning unless its category is suppressed
    pub fn warn(&self, diagnostic: Diagnostic) {
        if diagnostic.is_suppressed() {
            return;
        }
        match &diagnostic.loc {
            Some(loc) => {
                warn!("{} ({}:{}) {}", loc.file, loc.line, loc.column, diagnostic.message);
                if let Some(frame) = &diagnostic.frame {
                    warn!("{}", frame);
                }
            }
            None => warn!("{} [{}]", diagnostic.message, diagnostic.code),
        }
        self.reported.lock().push(diagnostic);
    }

    /// Warnings that passed the filter
    pub fn reported(&self) -> Vec<Diagnostic> {
        self.reported.lock().clone()
    }
}

/// Result of a `resolve_id` hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    /// Absolute path or virtual id
    pub id: String,
    /// External modules are left to the runtime loader
    pub external: bool,
}

impl ResolvedId {
    pub fn module(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }

    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// How an `import()` expression ends up in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicImportMode {
    /// Left to the runtime loader (`sap.ui.require`) under its specifier
    Verbatim,
    /// Bundled into the importing fragment
    Inline,
    /// Bundled into a separate chunk
    Split,
}

/// A transformation stage of the bundling pipeline
///
/// Hooks:
/// - `resolve_id`: first stage returning `Some` wins
/// - `load`: first stage returning `Some` wins, otherwise the file is read
/// - `transform`: every stage sees the output of the previous one
/// - `dynamic_import`: first stage returning `Some` wins, default is inline
pub trait Stage: Send + Sync {
    /// Unique name for this stage
    fn name(&self) -> &str;

    /// Called once before the entry is resolved
    fn build_start(&self, _context: &StageContext) -> Result<()> {
        Ok(())
    }

    /// Map a specifier imported by `importer` (None for the entry) to a module id
    fn resolve_id(
        &self,
        _specifier: &str,
        _importer: Option<&str>,
        _context: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        Ok(None)
    }

    /// Provide the code of a module id
    fn load(&self, _id: &str, _context: &StageContext) -> Result<Option<String>> {
        Ok(None)
    }

    /// Rewrite the code of a module; `None` leaves it unchanged
    fn transform(&self, _code: &str, _id: &str, _context: &StageContext) -> Result<Option<String>> {
        Ok(None)
    }

    /// Decide how an `import(specifier)` inside `importer` is emitted
    fn dynamic_import(
        &self,
        _specifier: &str,
        _importer: &str,
        _context: &StageContext,
    ) -> Result<Option<DynamicImportMode>> {
        Ok(None)
    }
}

/// Ordered list of stages driven by the pipeline
#[derive(Clone, Default)]
pub struct StageChain {
    stages: Vec<Arc<dyn Stage>>,
}

impl StageChain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn extend(&mut self, stages: impl IntoIterator<Item = Arc<dyn Stage>>) {
        self.stages.extend(stages);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn build_start(&self, context: &StageContext) -> Result<()> {
        for stage in &self.stages {
            stage
                .build_start(context)
                .map_err(|e| tag(stage.as_ref(), "build_start", e))?;
        }
        Ok(())
    }

    pub fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        context: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        for stage in &self.stages {
            let resolved = stage
                .resolve_id(specifier, importer, context)
                .map_err(|e| tag(stage.as_ref(), "resolve_id", e))?;
            if resolved.is_some() {
                return Ok(resolved);
            }
        }
        Ok(None)
    }

    pub fn load(&self, id: &str, context: &StageContext) -> Result<Option<String>> {
        for stage in &self.stages {
            let loaded = stage
                .load(id, context)
                .map_err(|e| tag(stage.as_ref(), "load", e))?;
            if loaded.is_some() {
                return Ok(loaded);
            }
        }
        Ok(None)
    }

    pub fn transform(&self, mut code: String, id: &str, context: &StageContext) -> Result<String> {
        for stage in &self.stages {
            if let Some(transformed) = stage
                .transform(&code, id, context)
                .map_err(|e| tag(stage.as_ref(), "transform", e))?
            {
                code = transformed;
            }
        }
        Ok(code)
    }

    pub fn dynamic_import(
        &self,
        specifier: &str,
        importer: &str,
        context: &StageContext,
    ) -> Result<DynamicImportMode> {
        for stage in &self.stages {
            if let Some(mode) = stage
                .dynamic_import(specifier, importer, context)
                .map_err(|e| tag(stage.as_ref(), "dynamic_import", e))?
            {
                return Ok(mode);
            }
        }
        Ok(DynamicImportMode::Inline)
    }
}

fn tag(stage: &dyn Stage, hook: &'static str, err: ModulesError) -> ModulesError {
    match err {
        ModulesError::Stage { .. } => err,
        ModulesError::Parse {
            ref message,
            context: Some(ref context),
        }
        | ModulesError::Build {
            ref message,
            context: Some(ref context),
        } => ModulesError::stage(stage.name(), hook, message.clone()).with_context(context.clone()),
        other => ModulesError::stage(stage.name(), hook, other.to_string()),
    }
}
