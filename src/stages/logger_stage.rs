use crate::core::stage::{ResolvedId, Stage, StageContext};
use crate::utils::Result;
use tracing::debug;

/// Traces every hook invocation on the verbose channel; never changes output
pub struct LoggerStage;

impl Stage for LoggerStage {
    fn name(&self) -> &str {
        "logger"
    }

    fn build_start(&self, context: &StageContext) -> Result<()> {
        debug!(
            "Bundling {} from {} [{}]",
            context.entry,
            context.cwd.display(),
            context.main_fields.join(",")
        );
        Ok(())
    }

    fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        _context: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        match importer {
            Some(importer) => debug!("resolveId: {} (from {})", specifier, importer),
            None => debug!("resolveId: {} (entry)", specifier),
        }
        Ok(None)
    }

    fn load(&self, id: &str, _context: &StageContext) -> Result<Option<String>> {
        debug!("load: {}", id.trim_start_matches('\0'));
        Ok(None)
    }
}
