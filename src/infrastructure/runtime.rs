// Output templates for bundled fragments
// Every fragment is a sap.ui.define call; the entry hosts the module registry

use serde_json::{Map, Value};

/// Helpers handed to every module factory as `__h`
const HELPERS: &str = r#"  var __h = {
    export: function (exports, getters) {
      Object.keys(getters).forEach(function (name) {
        Object.defineProperty(exports, name, { enumerable: true, configurable: true, get: getters[name] });
      });
    },
    exportStar: function (exports, m) {
      Object.keys(m || {}).forEach(function (name) {
        if (name !== "default" && name !== "__esModule" && !Object.prototype.hasOwnProperty.call(exports, name)) {
          Object.defineProperty(exports, name, { enumerable: true, get: function () { return m[name]; } });
        }
      });
    },
    interopDefault: function (m) {
      return m && m.__esModule ? m["default"] : m;
    },
    namespace: function (m) {
      if (m && m.__esModule) return m;
      var ns = { "default": m };
      if (m && typeof m === "object") {
        Object.keys(m).forEach(function (name) {
          if (name !== "default") ns[name] = m[name];
        });
      }
      return ns;
    },
    define: function (module, require, id, deps, factory) {
      if (typeof id !== "string") { factory = deps; deps = id; }
      if (!Array.isArray(deps)) { factory = deps; deps = ["require", "exports", "module"]; }
      if (typeof factory !== "function") { module.exports = factory; return; }
      var args = deps.map(function (dep) {
        if (dep === "require") return require;
        if (dep === "exports") return module.exports;
        if (dep === "module") return module;
        return require(dep);
      });
      var result = factory.apply(module.exports, args);
      if (result !== undefined) module.exports = result;
    },
    meta: { url: "" },
    result: function (m) {
      if (!m || typeof m !== "object") return m;
      var onlyDefault = "default" in m && Object.keys(m).every(function (name) {
        return name === "default" || name === "__esModule";
      });
      return onlyDefault ? m["default"] : m;
    }
  };
"#;

/// Registry, loader and chunk merging of the entry fragment
const LOADER: &str = r#"  var __cache = {};
  function __chunk(name) {
    return new Promise(function (resolve, reject) {
      sap.ui.require([name], function (chunk) {
        Object.keys(chunk.externals).forEach(function (key) {
          if (!(key in __externals)) __externals[key] = chunk.externals[key];
        });
        Object.keys(chunk.modules).forEach(function (key) {
          if (!(key in __modules)) __modules[key] = chunk.modules[key];
        });
        resolve();
      }, reject);
    });
  }
  function __load(id) {
    var cached = __cache[id];
    if (cached) return cached.exports;
    var def = __modules[id];
    if (!def) throw new Error("Module " + id + " is not loaded");
    var module = { id: id, exports: {} };
    __cache[id] = module;
    var deps = def[1], dynamic = def[2];
    function require(spec) {
      var target = deps[spec];
      if (typeof target === "number") return __load(target);
      if (typeof target === "string") return __externals[target];
      throw new Error("Cannot find module '" + spec + "'");
    }
    function __import(spec) {
      var target = dynamic[spec] || [0, spec];
      var ready = target[0] === 2 ? __chunk(target[1]) : Promise.resolve();
      return ready.then(function () {
        if (target[0] !== 0) return __h.namespace(__load(target[target.length - 1]));
        return new Promise(function (resolve, reject) {
          sap.ui.require([target[1]], function (m) { resolve(__h.namespace(m)); }, reject);
        });
      });
    }
    def[0].call(module.exports, module, module.exports, require, __import, __h);
    return module.exports;
  }
"#;

/// Static dependency of a rendered module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedDep {
    Module(usize),
    External(String),
}

/// Dynamic import target of a rendered module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedDynamic {
    Verbatim(String),
    Inline(usize),
    Split { chunk: String, module: usize },
}

/// A module ready to be written into a fragment
#[derive(Debug, Clone)]
pub struct RenderedModule {
    pub index: usize,
    pub code: String,
    pub deps: Vec<(String, RenderedDep)>,
    pub dynamic: Vec<(String, RenderedDynamic)>,
}

/// Entry fragment: externals become define dependencies, modules the registry
pub fn render_entry(externals: &[String], modules: &[RenderedModule], entry: usize) -> String {
    let mut out = String::new();
    out.push_str(&define_header(externals));
    out.push_str(&format!("  var __externals = {};\n", externals_object(externals)));
    out.push_str("  var __modules = {\n");
    out.push_str(&render_modules(modules, "    "));
    out.push_str("  };\n");
    out.push_str(HELPERS);
    out.push_str(LOADER);
    out.push_str(&format!("  return __h.result(__load({}));\n", entry));
    out.push_str("});\n");
    out
}

/// Split fragment: returns its module table for the entry registry to merge
pub fn render_chunk(externals: &[String], modules: &[RenderedModule]) -> String {
    let mut out = String::new();
    out.push_str(&define_header(externals));
    out.push_str("  return {\n");
    out.push_str(&format!("    externals: {},\n", externals_object(externals)));
    out.push_str("    modules: {\n");
    out.push_str(&render_modules(modules, "      "));
    out.push_str("    }\n");
    out.push_str("  };\n");
    out.push_str("});\n");
    out
}

fn define_header(externals: &[String]) -> String {
    let names: Vec<String> = externals.iter().map(|name| quote(name)).collect();
    let params: Vec<String> = (0..externals.len()).map(|i| format!("__e{}", i)).collect();
    format!(
        "sap.ui.define([{}], function ({}) {{\n",
        names.join(", "),
        params.join(", ")
    )
}

fn externals_object(externals: &[String]) -> String {
    if externals.is_empty() {
        return "{}".to_string();
    }
    let entries: Vec<String> = externals
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}: __e{}", quote(name), i))
        .collect();
    format!("{{ {} }}", entries.join(", "))
}

fn render_modules(modules: &[RenderedModule], indent: &str) -> String {
    let rendered: Vec<String> = modules
        .iter()
        .map(|module| {
            format!(
                "{indent}{}: [function (module, exports, require, __import, __h) {{\n{}\n{indent}}}, {}, {}]",
                module.index,
                module.code.trim_end(),
                deps_table(&module.deps),
                dynamic_table(&module.dynamic),
                indent = indent
            )
        })
        .collect();
    if rendered.is_empty() {
        String::new()
    } else {
        format!("{}\n", rendered.join(",\n"))
    }
}

fn deps_table(deps: &[(String, RenderedDep)]) -> String {
    let mut table = Map::new();
    for (specifier, dep) in deps {
        let value = match dep {
            RenderedDep::Module(index) => Value::from(*index),
            RenderedDep::External(name) => Value::from(name.as_str()),
        };
        table.insert(specifier.clone(), value);
    }
    Value::Object(table).to_string()
}

fn dynamic_table(dynamic: &[(String, RenderedDynamic)]) -> String {
    let mut table = Map::new();
    for (specifier, target) in dynamic {
        let value = match target {
            RenderedDynamic::Verbatim(name) => Value::from(vec![Value::from(0), Value::from(name.as_str())]),
            RenderedDynamic::Inline(index) => Value::from(vec![Value::from(1), Value::from(*index)]),
            RenderedDynamic::Split { chunk, module } => Value::from(vec![
                Value::from(2),
                Value::from(chunk.as_str()),
                Value::from(*module),
            ]),
        };
        table.insert(specifier.clone(), value);
    }
    Value::Object(table).to_string()
}

fn quote(value: &str) -> String {
    Value::from(value).to_string()
}
