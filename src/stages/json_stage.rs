use crate::core::stage::{Stage, StageContext};
use crate::utils::{ErrorContext, ModulesError, Result};

/// Turns `.json` files into CommonJS modules exporting the parsed value
pub struct JsonStage;

impl Stage for JsonStage {
    fn name(&self) -> &str {
        "json"
    }

    fn transform(&self, code: &str, id: &str, _context: &StageContext) -> Result<Option<String>> {
        if !id.to_ascii_lowercase().ends_with(".json") {
            return Ok(None);
        }

        let value: serde_json::Value = serde_json::from_str(code).map_err(|e| {
            let snippet: Vec<&str> = code.lines().take(e.line()).collect();
            ModulesError::parse_with_context(
                format!("Could not parse JSON file: {}", e),
                ErrorContext::new()
                    .with_file(id)
                    .with_location(e.line(), e.column())
                    .with_snippet(snippet.join("\n")),
            )
        })?;

        Ok(Some(format!("module.exports = {};\n", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::context;

    #[test]
    fn test_json_becomes_module() {
        let out = JsonStage
            .transform("{\n  \"name\": \"lib\",\n  \"version\": \"1.0.0\"\n}", "/lib/package.json", &context())
            .unwrap()
            .unwrap();
        assert_eq!(out, "module.exports = {\"name\":\"lib\",\"version\":\"1.0.0\"};\n");
    }

    #[test]
    fn test_scripts_are_ignored() {
        assert_eq!(JsonStage.transform("{", "/lib/a.js", &context()).unwrap(), None);
    }

    #[test]
    fn test_invalid_json_reports_location() {
        let err = JsonStage
            .transform("{\n  \"a\": ,\n}", "/lib/data.json", &context())
            .unwrap_err();
        let detailed = err.format_detailed();
        assert!(detailed.contains("/lib/data.json"));
        assert!(detailed.contains("\"a\": ,"));
    }
}
