use crate::core::stage::{is_virtual, ResolvedId, Stage, StageContext};
use crate::infrastructure::node_resolver::{LookupMode, PackageLookup};
use crate::stages::is_relative;
use crate::utils::Result;
use std::path::{Path, PathBuf};

/// Standard package resolution from the importing module's location,
/// honouring the run's manifest field order
pub struct NodeResolveStage {
    lookup: PackageLookup,
}

impl NodeResolveStage {
    pub fn new() -> Self {
        Self {
            lookup: PackageLookup::new(),
        }
    }

    fn roots(importer: Option<&str>, context: &StageContext) -> Vec<PathBuf> {
        match importer.filter(|id| !is_virtual(id)) {
            Some(importer) => vec![Path::new(importer)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| context.cwd.clone())],
            None => {
                let mut roots = vec![context.cwd.clone()];
                roots.extend(context.dep_paths.iter().cloned());
                roots
            }
        }
    }
}

impl Default for NodeResolveStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for NodeResolveStage {
    fn name(&self) -> &str {
        "node-resolve"
    }

    fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        context: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        if is_virtual(specifier) {
            return Ok(None);
        }

        let mode = LookupMode::bundle(&context.main_fields);
        let roots = Self::roots(importer, context);

        let found = if Path::new(specifier).is_absolute() {
            self.lookup
                .load_as_file(Path::new(specifier), &mode)
                .or_else(|| self.lookup.load_as_directory(Path::new(specifier), &mode))
        } else if is_relative(specifier) {
            roots
                .first()
                .and_then(|base| self.lookup.resolve_relative(base, specifier, &mode))
        } else {
            self.lookup.resolve(specifier, &roots, &mode)
        };

        Ok(found.map(|path| ResolvedId::module(path.to_string_lossy().into_owned())))
    }
}
