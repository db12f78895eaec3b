use crate::support::Project;
use std::sync::Arc;
use ui5_modules::core::models::{KeepDynamicImports, ResourceConfig, ResourceOptions};
use ui5_modules::infrastructure::TokioFileSystemService;
use ui5_modules::ResourceService;

const ESM_INDEX: &str = r#"import format from "./format.js";
import Button from "sap/m/Button";
import data from "./data.json";

export const answer = data.answer;
export function render(value) {
  return new Button({ text: format(value) });
}
export function loadLocale() {
  return import("./locale/de.js");
}
"#;

fn widgets_project() -> Project {
    let project = Project::new();
    project.package(
        "widgets",
        r#"{ "name": "widgets", "module": "esm/index.js", "main": "cjs/index.js" }"#,
        &[
            ("esm/index.js", ESM_INDEX),
            (
                "esm/format.js",
                "module.exports = function format(v) { return \"[\" + v + \"]\"; };\n",
            ),
            ("esm/data.json", "{ \"answer\": 42 }\n"),
            ("esm/locale/de.js", "export default { hello: \"Hallo\" };\n"),
            (
                "cjs/index.js",
                "var mode = process.env.NODE_ENV;\nmodule.exports = { mode: mode, helper: require(\"./helper\") };\n",
            ),
            ("cjs/helper.js", "module.exports = \"commonjs helper\";\n"),
        ],
    );
    project
}

fn service(project: &Project) -> ResourceService {
    ResourceService::new(project.resolver(), Arc::new(TokioFileSystemService))
}

#[tokio::test]
async fn test_es_module_bundle_with_split_chunk() {
    let project = widgets_project();
    let service = service(&project);

    let entry = service
        .get_resource(
            "widgets",
            &ResourceConfig::default(),
            &ResourceOptions::new(&project.root),
        )
        .await
        .unwrap();

    assert!(entry
        .code
        .starts_with("sap.ui.define([\"sap/m/Button\"], function (__e0) {"));
    assert!(entry.code.contains("return __h.result(__load(0));"));
    assert!(entry.code.contains("answer"));
    assert!(entry.code.contains("__import(\"./locale/de.js\")"));
    assert!(!entry.code.contains("Hallo"));
    assert!(!entry.code.contains("export "));

    assert_eq!(entry.chunks.len(), 1);
    let (name, chunk) = entry.chunks.iter().next().unwrap();
    let hash = name.strip_prefix("widgets-").unwrap();
    assert_eq!(hash.len(), 8);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(entry.code.contains(&format!("\"./locale/de.js\":[2,\"{}\",", name)));

    assert!(chunk.code.starts_with("sap.ui.define([], function () {"));
    assert!(chunk.code.contains("Hallo"));
    assert!(chunk.code.contains("modules: {"));

    // the chunk is served by name without touching the resolver again
    let served = service
        .get_resource(
            name,
            &ResourceConfig::default(),
            &ResourceOptions::new(&project.root),
        )
        .await
        .unwrap();
    assert_eq!(served.code, chunk.code);
}

#[tokio::test]
async fn test_dynamic_imports_inline_when_not_kept() {
    let project = widgets_project();
    let service = service(&project);
    let config = ResourceConfig {
        keep_dynamic_imports: KeepDynamicImports::All(false),
        ..ResourceConfig::default()
    };

    let entry = service
        .get_resource("widgets", &config, &ResourceOptions::new(&project.root))
        .await
        .unwrap();

    assert!(entry.chunks.is_empty());
    assert!(entry.code.contains("Hallo"));
    assert!(entry.code.contains("\"./locale/de.js\":[1,"));
}

#[tokio::test]
async fn test_broken_es_entry_falls_back_to_commonjs() {
    let project = widgets_project();
    project.write("node_modules/widgets/esm/data.json", "{ \"answer\": ");
    let service = service(&project);

    let entry = service
        .get_resource(
            "widgets",
            &ResourceConfig::default(),
            &ResourceOptions::new(&project.root),
        )
        .await
        .unwrap();

    assert!(entry.code.starts_with("sap.ui.define([], function () {"));
    assert!(entry.code.contains("commonjs helper"));
    assert!(entry.code.contains("var mode = \"development\";"));
    assert!(!entry.code.contains("process.env.NODE_ENV"));
    assert!(entry.chunks.is_empty());
}

#[tokio::test]
async fn test_node_builtins_are_polyfilled() {
    let project = Project::new();
    project.package(
        "emitter",
        r#"{ "name": "emitter", "main": "index.js" }"#,
        &[(
            "index.js",
            "var EventEmitter = require(\"events\");\nmodule.exports = new EventEmitter();\n",
        )],
    );
    let service = service(&project);

    let entry = service
        .get_resource(
            "emitter",
            &ResourceConfig::default(),
            &ResourceOptions::new(&project.root),
        )
        .await
        .unwrap();

    assert!(entry.code.starts_with("sap.ui.define([], function () {"));
    assert!(entry.code.contains("EventEmitter.prototype.emit"));
}

async fn bundle_single(name: &str, index: &str, extra: &[(&str, &str)]) -> String {
    let project = Project::new();
    let mut files = vec![("index.js", index)];
    files.extend_from_slice(extra);
    project.package(name, &format!(r#"{{ "name": "{}", "main": "index.js" }}"#, name), &files);
    let service = service(&project);

    service
        .get_resource(name, &ResourceConfig::default(), &ResourceOptions::new(&project.root))
        .await
        .unwrap()
        .code
        .clone()
}

#[tokio::test]
async fn test_regex_literal_keeps_following_require() {
    let code = bundle_single(
        "urls",
        r#"var re = /^https?:\/\//; var dep = require("./dep"); module.exports = dep;"#,
        &[("dep.js", "module.exports = \"DEPENDENCY_BODY\";\n")],
    )
    .await;

    assert!(code.contains("DEPENDENCY_BODY"));
    assert!(code.contains("\"./dep\":"));
}

#[tokio::test]
async fn test_module_text_inside_template_is_not_lowered() {
    let source = "module.exports = `\nexport default function () {}\n`;";
    let code = bundle_single("tpl", &format!("{}\n", source), &[]).await;

    assert!(code.contains(source));
    assert!(!code.contains("exports[\"default\"] = function"));
    assert!(!code.contains("Object.defineProperty(exports, \"__esModule\""));
    assert!(!code.contains("export const __esModule"));
}

#[tokio::test]
async fn test_import_text_inside_string_is_kept() {
    let code = bundle_single("text", "module.exports = \"call import(x) later\";\n", &[]).await;

    assert!(code.contains("\"call import(x) later\""));
    assert!(!code.contains("__import(x)"));
}
