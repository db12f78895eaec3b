use crate::core::stage::{is_script_id, Stage, StageContext};
use crate::stages::commonjs_stage::is_es_module;
use crate::utils::Result;

/// Marks ES modules with an `__esModule` export so CommonJS consumers and
/// the runtime's interop treat their `default` export as the module value
pub struct InjectEsModuleStage;

impl Stage for InjectEsModuleStage {
    fn name(&self) -> &str {
        "inject-esmodule"
    }

    fn transform(&self, code: &str, id: &str, _context: &StageContext) -> Result<Option<String>> {
        if !is_script_id(id) || !is_es_module(code) || code.contains("__esModule") {
            return Ok(None);
        }
        Ok(Some(format!("{}\nexport const __esModule = true;\n", code.trim_end())))
    }
}
