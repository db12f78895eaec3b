use crate::core::stage::{ResolvedId, Stage, StageContext, VIRTUAL_PREFIX};
use crate::utils::Result;
use tracing::debug;

const SKIP_PREFIX: &str = "\0skip:";

/// Replaces stylesheet imports and selected modules with empty modules
pub struct SkipAssetsStage {
    extensions: Vec<String>,
    modules: Vec<String>,
}

impl SkipAssetsStage {
    pub fn new(extensions: Vec<String>, modules: Vec<String>) -> Self {
        Self {
            extensions,
            modules,
        }
    }

    fn skips(&self, specifier: &str) -> bool {
        if self.modules.iter().any(|m| m == specifier) {
            return true;
        }
        let file = specifier.split(['?', '#']).next().unwrap_or(specifier);
        file.rsplit_once('.')
            .is_some_and(|(_, ext)| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl Default for SkipAssetsStage {
    fn default() -> Self {
        Self::new(vec!["css".to_string()], vec!["crypto".to_string()])
    }
}

impl Stage for SkipAssetsStage {
    fn name(&self) -> &str {
        "skip-assets"
    }

    fn resolve_id(
        &self,
        specifier: &str,
        _importer: Option<&str>,
        _context: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        if specifier.starts_with(VIRTUAL_PREFIX) || !self.skips(specifier) {
            return Ok(None);
        }
        debug!("Skipping {}", specifier);
        Ok(Some(ResolvedId::module(format!("{}{}", SKIP_PREFIX, specifier))))
    }

    fn load(&self, id: &str, _context: &StageContext) -> Result<Option<String>> {
        Ok(id
            .starts_with(SKIP_PREFIX)
            .then(|| "module.exports = {};\n".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::context;

    #[test]
    fn test_skips_stylesheets_and_modules() {
        let stage = SkipAssetsStage::default();
        let ctx = context();

        let css = stage.resolve_id("./styles/main.CSS", Some("/a.js"), &ctx).unwrap().unwrap();
        assert_eq!(css.id, "\0skip:./styles/main.CSS");
        assert!(!css.external);

        assert!(stage.resolve_id("crypto", None, &ctx).unwrap().is_some());
        assert!(stage.resolve_id("crypto-js", None, &ctx).unwrap().is_none());
        assert!(stage.resolve_id("./util.js", None, &ctx).unwrap().is_none());
    }

    #[test]
    fn test_loads_empty_module() {
        let stage = SkipAssetsStage::default();
        let ctx = context();
        assert_eq!(
            stage.load("\0skip:crypto", &ctx).unwrap().as_deref(),
            Some("module.exports = {};\n")
        );
        assert_eq!(stage.load("/app/a.js", &ctx).unwrap(), None);
    }
}
