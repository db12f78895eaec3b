use crate::core::stage::{is_script_id, Diagnostic, Stage, StageContext};
use crate::infrastructure::scanner::{scan_module_syntax, ModuleSyntax};
use crate::stages::js_string;
use crate::utils::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// Each pattern runs against a single top-level declaration, so `^` is its first byte.

static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^import\s+(?P<clause>[\w$\s{},*]+?)\s*from\s*["'](?P<src>[^"']+)["'][ \t]*;?"#).unwrap()
});

static IMPORT_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^import\s*["'](?P<src>[^"']+)["'][ \t]*;?"#).unwrap());

static EXPORT_STAR_AS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^export\s*\*\s*as\s+(?P<name>[\w$]+)\s+from\s*["'](?P<src>[^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^export\s*\*\s*from\s*["'](?P<src>[^"']+)["'][ \t]*;?"#).unwrap());

static EXPORT_LIST_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^export\s*\{(?P<list>[^}]*)\}\s*from\s*["'](?P<src>[^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^export\s*\{(?P<list>[^}]*)\}[ \t]*;?"#).unwrap());

static EXPORT_DEFAULT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^export\s+default\s+(?P<kind>(?:async\s+)?function\s*\*?|class)\s+(?P<name>[\w$]+)"#).unwrap()
});

static EXPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^export\s+default\s+"#).unwrap());

static EXPORT_DESTRUCTURED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^export\s+(?P<kind>const|let|var)\s+\{(?P<names>[^}]*)\}"#).unwrap());

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^export\s+(?P<kind>const|let|var|(?:async\s+)?function\s*\*?|class)\s*(?P<name>[\w$]+)"#)
        .unwrap()
});

/// True when the code has top-level `import` / `export` declarations
pub fn is_es_module(code: &str) -> bool {
    scan_module_syntax(code).is_some_and(|syntax| syntax.is_es_module())
}

/// Lowers ES module syntax to the CommonJS form the runtime registry executes
///
/// Default imports resolve to `module.exports` for CommonJS dependencies and
/// to the `default` export for lowered ES modules.
pub struct CommonJsStage;

impl Stage for CommonJsStage {
    fn name(&self) -> &str {
        "commonjs"
    }

    fn transform(&self, code: &str, id: &str, context: &StageContext) -> Result<Option<String>> {
        if !is_script_id(id) {
            return Ok(None);
        }
        let syntax = match scan_module_syntax(code) {
            Some(syntax) if !syntax.is_empty() => syntax,
            _ => return Ok(None),
        };

        let lowered = lower_es_module(code, &syntax);
        if lowered.mixed_exports() {
            context.warn(Diagnostic::new(
                "MIXED_EXPORTS",
                format!(
                    "Entry module \"{}\" is using named and default exports together",
                    id.trim_start_matches('\0')
                ),
            ));
        }
        Ok(Some(lowered.code))
    }
}

#[derive(Debug, Default)]
struct LoweredModule {
    code: String,
    exported: Vec<String>,
    has_default: bool,
}

impl LoweredModule {
    fn mixed_exports(&self) -> bool {
        self.has_default && self.exported.iter().any(|name| name != "default" && name != "__esModule")
    }
}

/// Getter table entries `(exported name, expression)`
type Getters = Vec<(String, String)>;

#[derive(Debug, Default)]
struct Lowering {
    getters: Getters,
    counter: usize,
    es_marker: bool,
    assigns_default: bool,
}

impl Lowering {
    fn next_tmp(&mut self) -> String {
        let name = format!("__m{}", self.counter);
        self.counter += 1;
        name
    }

    /// Rewrites one `import` / `export` declaration
    fn statement(&mut self, text: &str) -> String {
        let code = EXPORT_STAR_AS.replace(text, |caps: &Captures| {
            let tmp = self.next_tmp();
            self.getters.push((caps["name"].to_string(), tmp.clone()));
            format!("var {} = __h.namespace(require({}));", tmp, js_string(&caps["src"]))
        });

        let code = EXPORT_STAR.replace(&code, |caps: &Captures| {
            format!("__h.exportStar(exports, require({}));", js_string(&caps["src"]))
        });

        let code = EXPORT_LIST_FROM.replace(&code, |caps: &Captures| {
            let tmp = self.next_tmp();
            for (local, exported) in parse_specifier_list(&caps["list"]) {
                let expr = if local == "default" {
                    format!("__h.interopDefault({})", tmp)
                } else {
                    format!("{}.{}", tmp, local)
                };
                self.getters.push((exported, expr));
            }
            format!("var {} = require({});", tmp, js_string(&caps["src"]))
        });

        let code = IMPORT_FROM.replace(&code, |caps: &Captures| {
            lower_import(&caps["clause"], &caps["src"], &mut || self.next_tmp())
        });

        let code = IMPORT_BARE.replace(&code, |caps: &Captures| format!("require({});", js_string(&caps["src"])));

        let code = EXPORT_LIST.replace(&code, |caps: &Captures| {
            for (local, exported) in parse_specifier_list(&caps["list"]) {
                self.getters.push((exported, local));
            }
            String::new()
        });

        let code = EXPORT_DEFAULT_DECL.replace(&code, |caps: &Captures| {
            self.getters.push(("default".to_string(), caps["name"].to_string()));
            format!("{} {}", caps["kind"].trim_end(), &caps["name"])
        });

        let code = EXPORT_DEFAULT.replace(&code, |_: &Captures| {
            self.assigns_default = true;
            "exports[\"default\"] = ".to_string()
        });

        let code = EXPORT_DESTRUCTURED.replace(&code, |caps: &Captures| {
            for name in caps["names"].split(',') {
                let binding = name.rsplit(':').next().unwrap_or(name);
                let binding = binding.split('=').next().unwrap_or(binding).trim();
                if !binding.is_empty() && !binding.starts_with("...") {
                    self.getters.push((binding.to_string(), binding.to_string()));
                }
            }
            format!("{} {{{}}}", &caps["kind"], &caps["names"])
        });

        let code = EXPORT_DECL.replace(&code, |caps: &Captures| {
            let name = &caps["name"];
            if name == "__esModule" {
                self.es_marker = true;
            } else {
                self.getters.push((name.to_string(), name.to_string()));
            }
            format!("{} {}", caps["kind"].trim_end(), name)
        });

        code.into_owned()
    }
}

/// Copies `code[from..to]` into `out` with every `import.meta` inside it
/// replaced, consuming those ranges from `meta`
fn copy_with_meta<'a>(
    out: &mut String,
    code: &str,
    from: usize,
    to: usize,
    meta: &mut std::iter::Peekable<impl Iterator<Item = &'a std::ops::Range<usize>>>,
) {
    let mut cursor = from;
    while let Some(range) = meta.next_if(|range| range.end <= to) {
        out.push_str(&code[cursor..range.start]);
        out.push_str("__h.meta");
        cursor = range.end;
    }
    out.push_str(&code[cursor..to]);
}

fn lower_es_module(code: &str, syntax: &ModuleSyntax) -> LoweredModule {
    let mut lowering = Lowering::default();
    let mut meta = syntax.meta.iter().peekable();
    let mut body = String::with_capacity(code.len());
    let mut cursor = 0;

    for declaration in &syntax.declarations {
        copy_with_meta(&mut body, code, cursor, declaration.start, &mut meta);
        let mut statement = String::new();
        copy_with_meta(&mut statement, code, declaration.start, declaration.end, &mut meta);
        body.push_str(&lowering.statement(&statement));
        cursor = declaration.end;
    }
    copy_with_meta(&mut body, code, cursor, code.len(), &mut meta);

    let Lowering {
        getters,
        es_marker,
        assigns_default,
        ..
    } = lowering;

    let mut prelude = String::new();
    if es_marker {
        prelude.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
    }
    if !getters.is_empty() {
        let entries: Vec<String> = getters
            .iter()
            .map(|(exported, expr)| format!("{}: function () {{ return {}; }}", js_string(exported), expr))
            .collect();
        prelude.push_str(&format!("__h.export(exports, {{ {} }});\n", entries.join(", ")));
    }

    let mut exported: Vec<String> = getters.into_iter().map(|(name, _)| name).collect();
    if es_marker {
        exported.push("__esModule".to_string());
    }
    let has_default = assigns_default || exported.iter().any(|name| name == "default");

    LoweredModule {
        code: format!("{}{}", prelude, body),
        exported,
        has_default,
    }
}

/// `var` bindings for one import clause
fn lower_import(clause: &str, source: &str, next_tmp: &mut impl FnMut() -> String) -> String {
    let clause = clause.trim();
    let required = format!("require({})", js_string(source));

    let (default_binding, rest) = if clause.starts_with('{') || clause.starts_with('*') {
        (None, clause)
    } else {
        match clause.split_once(',') {
            Some((default, rest)) => (Some(default.trim()), rest.trim()),
            None => (Some(clause), ""),
        }
    };

    let namespace = rest
        .strip_prefix('*')
        .and_then(|r| r.trim_start().strip_prefix("as"))
        .map(str::trim);
    let named = rest
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .map(parse_specifier_list)
        .unwrap_or_default();

    match (default_binding, namespace, named.is_empty()) {
        (Some(default), None, true) => {
            format!("var {} = __h.interopDefault({});", default, required)
        }
        (None, Some(ns), true) => format!("var {} = __h.namespace({});", ns, required),
        _ => {
            let tmp = next_tmp();
            let mut out = vec![format!("var {} = {};", tmp, required)];
            if let Some(default) = default_binding {
                out.push(format!("var {} = __h.interopDefault({});", default, tmp));
            }
            if let Some(ns) = namespace {
                out.push(format!("var {} = __h.namespace({});", ns, tmp));
            }
            for (imported, local) in named {
                if imported == "default" {
                    out.push(format!("var {} = __h.interopDefault({});", local, tmp));
                } else {
                    out.push(format!("var {} = {}.{};", local, tmp, imported));
                }
            }
            out.join(" ")
        }
    }
}

/// `a, b as c` into `(a, a)` and `(b, c)`
fn parse_specifier_list(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let mut parts = item.split_whitespace();
            let first = parts.next().unwrap_or_default().to_string();
            match (parts.next(), parts.next()) {
                (Some("as"), Some(alias)) => (first, alias.to_string()),
                _ => (first.clone(), first),
            }
        })
        .collect()
}
