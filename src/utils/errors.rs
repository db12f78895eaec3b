use std::path::PathBuf;
use thiserror::Error;

/// Location details attached to parse, build and stage errors
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code_snippet: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.code_snippet = Some(snippet);
        self
    }
}

#[derive(Error, Debug)]
pub enum ModulesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Build error: {message}")]
    Build {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("[{stage}] {hook}: {message}")]
    Stage {
        stage: String,
        hook: &'static str,
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Could not resolve \"{specifier}\": {message}")]
    Resolve { specifier: String, message: String },

    #[error("NPM package {0} not found. Ignoring package...")]
    PackageNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModulesError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            context: None,
        }
    }

    pub fn parse_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Parse {
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            context: None,
        }
    }

    pub fn build_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Build {
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn stage(stage: &str, hook: &'static str, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            hook,
            message: message.into(),
            context: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Attach location details to a stage error; other variants pass through.
    pub fn with_context(self, context: ErrorContext) -> Self {
        match self {
            Self::Stage {
                stage,
                hook,
                message,
                ..
            } => Self::Stage {
                stage,
                hook,
                message,
                context: Some(context),
            },
            Self::Parse { message, .. } => Self::Parse {
                message,
                context: Some(context),
            },
            Self::Build { message, .. } => Self::Build {
                message,
                context: Some(context),
            },
            other => other,
        }
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        match self {
            ModulesError::Parse { message, context } => {
                self.format_error_with_context("Parse Error", message, context)
            }
            ModulesError::Build { message, context } => {
                self.format_error_with_context("Build Error", message, context)
            }
            ModulesError::Stage {
                stage,
                hook,
                message,
                context,
            } => self.format_error_with_context(
                &format!("Stage Error [{}:{}]", stage, hook),
                message,
                context,
            ),
            _ => self.to_string(),
        }
    }

    fn format_error_with_context(
        &self,
        error_type: &str,
        message: &str,
        context: &Option<ErrorContext>,
    ) -> String {
        let mut output = format!("{}: {}", error_type, message);

        if let Some(ctx) = context {
            if let Some(ref file_path) = ctx.file_path {
                output.push_str(&format!("\n  File: {}", file_path.display()));
            }

            if let (Some(line), Some(column)) = (ctx.line, ctx.column) {
                output.push_str(&format!("\n  Location: line {}, column {}", line, column));
            }

            if let Some(ref snippet) = ctx.code_snippet {
                output.push_str(&format!(
                    "\n  Code:\n{}",
                    self.format_code_snippet(snippet, ctx.line)
                ));
            }
        }

        output
    }

    fn format_code_snippet(&self, snippet: &str, error_line: Option<usize>) -> String {
        let mut output = String::new();

        for (i, line) in snippet.lines().enumerate() {
            let line_num = i + 1;
            if error_line == Some(line_num) {
                output.push_str(&format!("> {:3} | {}\n", line_num, line));
            } else {
                output.push_str(&format!("  {:3} | {}\n", line_num, line));
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, ModulesError>;

impl From<regex::Error> for ModulesError {
    fn from(err: regex::Error) -> Self {
        ModulesError::parse(format!("Regex error: {}", err))
    }
}

impl From<glob::PatternError> for ModulesError {
    fn from(err: glob::PatternError) -> Self {
        ModulesError::config(format!("Invalid glob pattern: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = ModulesError::stage("json", "transform", "Unexpected token");
        assert_eq!(err.to_string(), "[json] transform: Unexpected token");
    }

    #[test]
    fn test_format_detailed_with_location() {
        let context = ErrorContext::new()
            .with_file("/pkg/data.json")
            .with_location(2, 5)
            .with_snippet("{\n  oops\n}".to_string());
        let err = ModulesError::stage("json", "transform", "expected value").with_context(context);

        let detailed = err.format_detailed();
        assert!(detailed.contains("Stage Error [json:transform]"));
        assert!(detailed.contains("File: /pkg/data.json"));
        assert!(detailed.contains("line 2, column 5"));
        assert!(detailed.contains(">   2 |   oops"));
    }

    #[test]
    fn test_package_not_found_message() {
        let err = ModulesError::PackageNotFound("chart.js".to_string());
        assert_eq!(err.to_string(), "NPM package chart.js not found. Ignoring package...");
    }
}
