use crate::utils::{ErrorContext, ModulesError, Result};
use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, Expression, Statement};
use oxc_ast::AstKind;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{GetSpan, SourceType};
use std::ops::Range;

/// A string-literal module reference and the byte offset of its literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    pub specifier: String,
    pub offset: usize,
}

/// Module references of a CommonJS source, in source order
#[derive(Debug, Clone, Default)]
pub struct DependencyScan {
    /// `require("x")` calls
    pub requires: Vec<ImportSite>,
    /// `import("x")` expressions with a literal source
    pub dynamic_imports: Vec<ImportSite>,
    /// Offset of the `import` keyword of every `import(...)` expression
    pub import_keywords: Vec<usize>,
    /// Prologue directives other than `use strict`
    pub directives: Vec<String>,
}

/// Parse `code` as a CommonJS script and collect its module references
///
/// Code that does not parse is an error: emitting it would yield a bundle
/// whose dependency table is missing entries.
pub fn scan_dependencies(code: &str, id: &str) -> Result<DependencyScan> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::cjs()).parse();

    if parsed.panicked || !parsed.errors.is_empty() {
        let reason = parsed
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unrecoverable syntax error".to_string());
        return Err(ModulesError::parse_with_context(
            format!("Could not parse {}: {}", id.trim_start_matches('\0'), reason),
            ErrorContext::new().with_file(id.trim_start_matches('\0')),
        ));
    }

    let mut scan = DependencyScan {
        directives: parsed
            .program
            .directives
            .iter()
            .map(|d| d.directive.as_str().to_string())
            .filter(|d| d != "use strict")
            .collect(),
        ..DependencyScan::default()
    };

    let semantic = SemanticBuilder::new().build(&parsed.program).semantic;
    for node in semantic.nodes().iter() {
        match node.kind() {
            AstKind::CallExpression(call) => {
                let is_require =
                    matches!(&call.callee, Expression::Identifier(ident) if ident.name.as_str() == "require");
                if !is_require || call.arguments.len() != 1 {
                    continue;
                }
                if let Argument::StringLiteral(literal) = &call.arguments[0] {
                    scan.requires.push(ImportSite {
                        specifier: literal.value.as_str().to_string(),
                        offset: literal.span.start as usize,
                    });
                }
            }
            AstKind::ImportExpression(import) => {
                scan.import_keywords.push(import.span.start as usize);
                if let Expression::StringLiteral(literal) = &import.source {
                    scan.dynamic_imports.push(ImportSite {
                        specifier: literal.value.as_str().to_string(),
                        offset: literal.span.start as usize,
                    });
                }
            }
            _ => {}
        }
    }

    // node order follows the tree, not the text
    scan.requires.sort_by_key(|site| site.offset);
    scan.dynamic_imports.sort_by_key(|site| site.offset);
    scan.import_keywords.sort_unstable();
    Ok(scan)
}

/// Where ES module syntax sits in a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSyntax {
    /// Top-level `import` / `export` statements
    pub declarations: Vec<Range<usize>>,
    /// `import.meta` expressions
    pub meta: Vec<Range<usize>>,
}

impl ModuleSyntax {
    pub fn is_es_module(&self) -> bool {
        !self.declarations.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty() && self.meta.is_empty()
    }
}

/// Parse `code` as an ES module; `None` when it only parses as a script
pub fn scan_module_syntax(code: &str) -> Option<ModuleSyntax> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return None;
    }

    let declarations = parsed
        .program
        .body
        .iter()
        .filter(|statement| {
            matches!(
                statement,
                Statement::ImportDeclaration(_)
                    | Statement::ExportAllDeclaration(_)
                    | Statement::ExportDefaultDeclaration(_)
                    | Statement::ExportNamedDeclaration(_)
            )
        })
        .map(|statement| {
            let span = statement.span();
            span.start as usize..span.end as usize
        })
        .collect();

    let semantic = SemanticBuilder::new().build(&parsed.program).semantic;
    let mut meta: Vec<Range<usize>> = semantic
        .nodes()
        .iter()
        .filter_map(|node| match node.kind() {
            AstKind::MetaProperty(property) if property.meta.name.as_str() == "import" => {
                Some(property.span.start as usize..property.span.end as usize)
            }
            _ => None,
        })
        .collect();
    meta.sort_by_key(|range| range.start);

    Some(ModuleSyntax { declarations, meta })
}
