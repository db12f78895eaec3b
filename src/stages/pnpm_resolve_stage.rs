use crate::core::models::{Resolution, ResolveContext};
use crate::core::stage::{is_virtual, ResolvedId, Stage, StageContext};
use crate::infrastructure::node_resolver::ModuleResolver;
use crate::stages::is_relative;
use crate::utils::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Falls back to the engine's resolver so packages reachable only through
/// the project root or extra dependency paths (pnpm, monorepos) are found
pub struct PnpmResolveStage {
    resolver: Arc<ModuleResolver>,
}

impl PnpmResolveStage {
    pub fn new(resolver: Arc<ModuleResolver>) -> Self {
        Self { resolver }
    }
}

impl Stage for PnpmResolveStage {
    fn name(&self) -> &str {
        "pnpm-resolve"
    }

    fn resolve_id(
        &self,
        specifier: &str,
        _importer: Option<&str>,
        context: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        if is_virtual(specifier) || is_relative(specifier) || Path::new(specifier).is_absolute() {
            return Ok(None);
        }

        let resolve_context = ResolveContext::new(context.cwd.clone())
            .with_dep_paths(context.dep_paths.clone())
            .with_main_fields(context.main_fields.clone());

        match self.resolver.resolve(specifier, &resolve_context) {
            Resolution::Found(path) => Ok(Some(ResolvedId::module(
                path.to_string_lossy().into_owned(),
            ))),
            Resolution::Unresolved(reason) => {
                debug!("pnpm-resolve: {} unresolved ({:?})", specifier, reason);
                Ok(None)
            }
            Resolution::Failed(message) => {
                debug!("pnpm-resolve: {} failed: {}", specifier, message);
                Ok(None)
            }
        }
    }
}
