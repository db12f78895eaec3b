use crate::core::stage::{is_script_id, Stage, StageContext};
use crate::utils::Result;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Build-time constant replacement (`process.env.NODE_ENV` and friends)
pub struct ReplaceStage {
    pattern: Option<Regex>,
    values: HashMap<String, String>,
}

impl ReplaceStage {
    /// `values` maps an expression to the literal JavaScript replacing it
    pub fn new(values: HashMap<String, String>) -> Result<Self> {
        if values.is_empty() {
            return Ok(Self {
                pattern: None,
                values,
            });
        }

        // longest keys first so `a.b.c` wins over `a.b`
        let mut keys: Vec<&String> = values.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let alternatives: Vec<String> = keys.iter().map(|k| regex::escape(k)).collect();
        let pattern = Regex::new(&format!(
            r"(^|[^\w$.])({})\b",
            alternatives.join("|")
        ))?;

        Ok(Self {
            pattern: Some(pattern),
            values,
        })
    }

    /// Replaces `process.env.NODE_ENV` with the given mode
    pub fn node_env(mode: &str) -> Result<Self> {
        let mut values = HashMap::new();
        values.insert(
            "process.env.NODE_ENV".to_string(),
            super::js_string(mode),
        );
        Self::new(values)
    }

    fn replace(&self, code: &str) -> Option<String> {
        let pattern = self.pattern.as_ref()?;
        if !pattern.is_match(code) {
            return None;
        }

        let replaced = pattern.replace_all(code, |caps: &Captures| {
            let value = self.values.get(&caps[2]).map(String::as_str).unwrap_or(&caps[2]);
            format!("{}{}", &caps[1], value)
        });
        Some(replaced.into_owned())
    }
}

impl Stage for ReplaceStage {
    fn name(&self) -> &str {
        "replace"
    }

    fn transform(&self, code: &str, id: &str, _context: &StageContext) -> Result<Option<String>> {
        if !is_script_id(id) {
            return Ok(None);
        }
        Ok(self.replace(code))
    }
}
