use crate::core::models::KeepDynamicImports;
use crate::core::stage::{DynamicImportMode, Stage, StageContext};
use crate::stages::is_relative;
use crate::utils::Result;
use std::path::Path;

/// Decides how `import()` expressions of one bundle end up in the output
///
/// When dynamic imports are kept for the bundled module, package imports are
/// left to the runtime loader and file imports become separate chunks.
/// Otherwise everything is inlined into the importing fragment.
pub struct DynamicImportsStage {
    module_name: String,
    keep: KeepDynamicImports,
}

impl DynamicImportsStage {
    pub fn new(module_name: impl Into<String>, keep: KeepDynamicImports) -> Self {
        Self {
            module_name: module_name.into(),
            keep,
        }
    }
}

impl Stage for DynamicImportsStage {
    fn name(&self) -> &str {
        "dynamic-imports"
    }

    fn dynamic_import(
        &self,
        specifier: &str,
        _importer: &str,
        _context: &StageContext,
    ) -> Result<Option<DynamicImportMode>> {
        if !self.keep.applies_to(&self.module_name) {
            return Ok(Some(DynamicImportMode::Inline));
        }

        let mode = if is_relative(specifier) || Path::new(specifier).is_absolute() {
            DynamicImportMode::Split
        } else {
            DynamicImportMode::Verbatim
        };
        Ok(Some(mode))
    }
}
