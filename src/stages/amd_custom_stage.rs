use crate::core::stage::{is_script_id, is_virtual, Stage, StageContext};
use crate::stages::js_string;
use crate::utils::Result;
use once_cell::sync::Lazy;
use regex::Regex;

/// UMD checks for an AMD loader
static AMD_CHECK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"typeof\s+define\s*===?\s*["']function["']\s*&&\s*define\.amd\b|\bdefine\.amd\b"#).unwrap()
});

/// A top-level `define(` call of an AMD module
static AMD_DEFINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*define\s*\(").unwrap());

/// Dependency array of the first `define` call
static AMD_DEPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"define\s*\(\s*(?:["'][^"']*["']\s*,\s*)?\[(?P<deps>[^\]]*)\]"#).unwrap()
});

static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["']([^"']+)["']"#).unwrap());

const AMD_KEYWORDS: [&str; 3] = ["require", "exports", "module"];

/// Runs AMD and UMD modules inside the CommonJS registry
///
/// UMD wrappers are forced onto their CommonJS branch; plain AMD modules get
/// their `define` call routed through the runtime helper with statically
/// visible `require` calls for every dependency.
pub struct AmdCustomStage;

impl AmdCustomStage {
    fn adapt(&self, code: &str) -> Option<String> {
        let mut changed = false;
        let mut code = code.to_string();

        if AMD_CHECK.is_match(&code) {
            code = AMD_CHECK.replace_all(&code, "false").into_owned();
            changed = true;
        }

        if AMD_DEFINE.is_match(&code) && !code.contains("typeof define") {
            let deps: Vec<String> = AMD_DEPS
                .captures(&code)
                .map(|caps| {
                    STRING_LITERAL
                        .captures_iter(&caps["deps"])
                        .map(|dep| dep[1].to_string())
                        .filter(|dep| !AMD_KEYWORDS.contains(&dep.as_str()))
                        .collect()
                })
                .unwrap_or_default();

            code = AMD_DEFINE
                .replace(&code, "__h.define(module, require, ")
                .into_owned();

            if !deps.is_empty() {
                let hints: Vec<String> = deps
                    .iter()
                    .map(|dep| format!("require({});", js_string(dep)))
                    .collect();
                code.push_str(&format!("\nif (false) {{ {} }}\n", hints.join(" ")));
            }
            changed = true;
        }

        changed.then_some(code)
    }
}

impl Stage for AmdCustomStage {
    fn name(&self) -> &str {
        "amd-custom"
    }

    fn transform(&self, code: &str, id: &str, _context: &StageContext) -> Result<Option<String>> {
        if !is_script_id(id) || is_virtual(id) {
            return Ok(None);
        }
        Ok(self.adapt(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::context;

    #[test]
    fn test_umd_takes_commonjs_branch() {
        let umd = r#"(function (root, factory) {
  if (typeof define === 'function' && define.amd) { define(['exports'], factory); }
  else if (typeof exports === 'object') { factory(exports); }
})(this, function (exports) { exports.x = 1; });"#;

        let out = AmdCustomStage.transform(umd, "/lib/umd.js", &context()).unwrap().unwrap();
        assert!(out.contains("if (false) { define(['exports'], factory); }"));
        assert!(!out.contains("__h.define"));
    }

    #[test]
    fn test_plain_amd_is_routed_through_runtime() {
        let amd = "define([\"require\", \"exports\", \"./dep\", 'lodash'], function (require, exports, dep, _) {\n  exports.x = dep;\n});";

        let out = AmdCustomStage.transform(amd, "/lib/amd.js", &context()).unwrap().unwrap();
        assert!(out.starts_with("__h.define(module, require, [\"require\""));
        assert!(out.contains("if (false) { require(\"./dep\"); require(\"lodash\"); }"));
    }

    #[test]
    fn test_plain_commonjs_is_untouched() {
        let out = AmdCustomStage
            .transform("module.exports = function define() {};", "/lib/a.js", &context())
            .unwrap();
        assert_eq!(out, None);
    }
}
