use crate::core::interfaces::FileSystemService;
use oxc_allocator::Allocator;
use oxc_ast::ast::Expression;
use oxc_ast::AstKind;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Global namespace object of the UI5 loader
pub const NAMESPACE_ROOT: &str = "sap";

/// Segment between the root and the loader call
pub const NAMESPACE_SEGMENT: &str = "ui";

/// Loader entry points that mark a module as native
pub const LOADER_CALLS: [&str; 2] = ["require", "define"];

/// Detects sources that already use `sap.ui.define` / `sap.ui.require`
pub struct ModuleClassifier {
    fs: Arc<dyn FileSystemService>,
}

impl ModuleClassifier {
    pub fn new(fs: Arc<dyn FileSystemService>) -> Self {
        Self { fs }
    }

    /// Read and classify a file; unreadable files are not native
    pub async fn is_native_module(&self, path: &Path) -> bool {
        match self.fs.read_file(path).await {
            Ok(source) => {
                let native = is_native_source(&source);
                if !native {
                    debug!("{} is not a UI5 module", path.display());
                }
                native
            }
            Err(e) => {
                debug!("Failed to read dependency {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// True when the source parses and calls `sap.ui.require` or `sap.ui.define`
pub fn is_native_source(source: &str) -> bool {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::cjs()).parse();

    if parsed.panicked || !parsed.errors.is_empty() {
        debug!("Failed to parse dependency: {} syntax errors", parsed.errors.len());
        return false;
    }

    let semantic = SemanticBuilder::new().build(&parsed.program).semantic;
    let native = semantic.nodes().iter().any(|node| match node.kind() {
        AstKind::CallExpression(call) => is_loader_callee(&call.callee),
        _ => false,
    });
    native
}

fn is_loader_callee(callee: &Expression) -> bool {
    let Expression::StaticMemberExpression(call_member) = callee else {
        return false;
    };
    if !LOADER_CALLS.contains(&call_member.property.name.as_str()) {
        return false;
    }

    let Expression::StaticMemberExpression(namespace) = &call_member.object else {
        return false;
    };
    if namespace.property.name.as_str() != NAMESPACE_SEGMENT {
        return false;
    }

    matches!(&namespace.object, Expression::Identifier(root) if root.name.as_str() == NAMESPACE_ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::TokioFileSystemService;
    use tempfile::tempdir;

    #[test]
    fn test_define_is_native() {
        assert!(is_native_source("sap.ui.define([], function(){});"));
    }

    #[test]
    fn test_nested_require_is_native() {
        let source = r#"
            (function () {
                if (true) {
                    sap.ui.require(["sap/m/Button"], function (Button) {});
                }
            })();
        "#;
        assert!(is_native_source(source));
    }

    #[test]
    fn test_commonjs_is_not_native() {
        assert!(!is_native_source("module.exports = function(){};"));
    }

    #[test]
    fn test_near_misses_are_not_native() {
        assert!(!is_native_source("sap.ui.getCore();"));
        assert!(!is_native_source("foo.ui.define([], function(){});"));
        assert!(!is_native_source("sap.m.define([], function(){});"));
        assert!(!is_native_source("var s = 'sap.ui.define(';"));
        assert!(!is_native_source("window.sap.ui.define([], function(){});"));
    }

    #[test]
    fn test_invalid_syntax_is_not_native() {
        assert!(!is_native_source("sap.ui.define([], function( {"));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_not_native() {
        let classifier = ModuleClassifier::new(Arc::new(TokioFileSystemService));
        let dir = tempdir().unwrap();
        assert!(!classifier.is_native_module(&dir.path().join("missing.js")).await);

        let file = dir.path().join("lib.js");
        std::fs::write(&file, "sap.ui.require(['a'], function(){});").unwrap();
        assert!(classifier.is_native_module(&file).await);
    }
}
