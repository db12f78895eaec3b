use crate::core::stage::{is_script_id, is_virtual, ResolvedId, Stage, StageContext};
use crate::stages::js_string;
use crate::utils::Result;
use once_cell::sync::Lazy;
use regex::Regex;

const POLYFILL_PREFIX: &str = "\0polyfill:";

/// Node built-ins that resolve to a browser stand-in
pub const NODE_BUILTINS: [&str; 30] = [
    "assert", "buffer", "child_process", "cluster", "console", "constants", "crypto", "dgram",
    "dns", "domain", "events", "fs", "http", "https", "module", "net", "os", "path", "process",
    "punycode", "querystring", "readline", "stream", "string_decoder", "timers", "tls", "tty",
    "url", "util", "zlib",
];

static PROCESS_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^.\w$])process\s*\.").unwrap());
static GLOBAL_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^.\w$'\x22])global\b\s*[.\[]").unwrap());
static DECLARES_PROCESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:var|let|const|function)\s+process\b").unwrap());

const PROCESS_POLYFILL: &str = r#"var env = { NODE_ENV: "development" };
function nextTick(fn) {
  var args = Array.prototype.slice.call(arguments, 1);
  Promise.resolve().then(function () { fn.apply(null, args); });
}
module.exports = {
  title: "browser",
  browser: true,
  env: env,
  argv: [],
  version: "",
  versions: {},
  platform: "browser",
  nextTick: nextTick,
  cwd: function () { return "/"; },
  on: function () {},
  emit: function () {}
};
"#;

const EVENTS_POLYFILL: &str = r#"function EventEmitter() { this._events = {}; }
EventEmitter.prototype.on = EventEmitter.prototype.addListener = function (name, fn) {
  (this._events[name] = this._events[name] || []).push(fn);
  return this;
};
EventEmitter.prototype.once = function (name, fn) {
  var self = this;
  function wrapper() { self.off(name, wrapper); fn.apply(self, arguments); }
  return this.on(name, wrapper);
};
EventEmitter.prototype.off = EventEmitter.prototype.removeListener = function (name, fn) {
  var list = this._events[name] || [];
  this._events[name] = list.filter(function (l) { return l !== fn; });
  return this;
};
EventEmitter.prototype.emit = function (name) {
  var args = Array.prototype.slice.call(arguments, 1);
  var list = (this._events[name] || []).slice();
  list.forEach(function (fn) { fn.apply(this, args); }, this);
  return list.length > 0;
};
module.exports = EventEmitter;
module.exports.EventEmitter = EventEmitter;
"#;

const UTIL_POLYFILL: &str = r#"exports.inherits = function (ctor, superCtor) {
  ctor.super_ = superCtor;
  ctor.prototype = Object.create(superCtor.prototype, {
    constructor: { value: ctor, enumerable: false, writable: true, configurable: true }
  });
};
exports.deprecate = function (fn) { return fn; };
exports.format = function () { return Array.prototype.join.call(arguments, " "); };
exports.isArray = Array.isArray;
"#;

const PATH_POLYFILL: &str = r#"function normalize(parts) {
  var out = [];
  parts.forEach(function (part) {
    if (!part || part === ".") return;
    if (part === "..") out.pop(); else out.push(part);
  });
  return out;
}
exports.sep = "/";
exports.join = function () {
  var joined = Array.prototype.join.call(arguments, "/");
  return (joined.charAt(0) === "/" ? "/" : "") + normalize(joined.split("/")).join("/");
};
exports.basename = function (p, ext) {
  var base = p.split("/").pop();
  return ext && base.slice(-ext.length) === ext ? base.slice(0, -ext.length) : base;
};
exports.dirname = function (p) {
  var parts = p.split("/");
  parts.pop();
  return parts.join("/") || (p.charAt(0) === "/" ? "/" : ".");
};
exports.extname = function (p) {
  var base = p.split("/").pop();
  var dot = base.lastIndexOf(".");
  return dot > 0 ? base.slice(dot) : "";
};
"#;

const ASSERT_POLYFILL: &str = r#"function assert(value, message) {
  if (!value) throw new Error(message || "Assertion failed");
}
assert.ok = assert;
assert.equal = function (a, b, message) { assert(a == b, message); };
assert.strictEqual = function (a, b, message) { assert(a === b, message); };
module.exports = assert;
"#;

/// Browser stand-ins for Node built-ins and the `process` / `global` globals
pub struct NodePolyfillsStage;

impl NodePolyfillsStage {
    fn builtin_name(specifier: &str) -> Option<&str> {
        let name = specifier.strip_prefix("node:").unwrap_or(specifier);
        let name = name.strip_suffix('/').unwrap_or(name);
        NODE_BUILTINS.contains(&name).then_some(name)
    }

    fn polyfill_source(name: &str) -> String {
        match name {
            "process" => PROCESS_POLYFILL.to_string(),
            "events" => EVENTS_POLYFILL.to_string(),
            "util" => UTIL_POLYFILL.to_string(),
            "path" => PATH_POLYFILL.to_string(),
            "assert" => ASSERT_POLYFILL.to_string(),
            _ => "module.exports = {};\n".to_string(),
        }
    }
}

impl Stage for NodePolyfillsStage {
    fn name(&self) -> &str {
        "node-polyfills"
    }

    fn resolve_id(
        &self,
        specifier: &str,
        _importer: Option<&str>,
        _context: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        Ok(Self::builtin_name(specifier)
            .map(|name| ResolvedId::module(format!("{}{}", POLYFILL_PREFIX, name))))
    }

    fn load(&self, id: &str, _context: &StageContext) -> Result<Option<String>> {
        Ok(id.strip_prefix(POLYFILL_PREFIX).map(Self::polyfill_source))
    }

    fn transform(&self, code: &str, id: &str, _context: &StageContext) -> Result<Option<String>> {
        if is_virtual(id) || !is_script_id(id) {
            return Ok(None);
        }

        let mut prelude = String::new();
        if PROCESS_REF.is_match(code) && !DECLARES_PROCESS.is_match(code) {
            prelude.push_str(&format!("var process = require({});\n", js_string("process")));
        }
        if GLOBAL_REF.is_match(code) {
            prelude.push_str(
                "var global = typeof globalThis !== \"undefined\" ? globalThis : typeof self !== \"undefined\" ? self : window;\n",
            );
        }

        if prelude.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!("{}{}", prelude, code)))
        }
    }
}
