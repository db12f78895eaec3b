// Built-in stages of the bundling pipeline, in chain order
pub mod logger_stage;
pub mod replace_stage;
pub mod inject_esmodule_stage;
pub mod skip_assets_stage;
pub mod commonjs_stage;
pub mod amd_custom_stage;
pub mod node_polyfills_stage;
pub mod json_stage;
pub mod node_resolve_stage;
pub mod pnpm_resolve_stage;
pub mod dynamic_imports_stage;

pub use logger_stage::LoggerStage;
pub use replace_stage::ReplaceStage;
pub use inject_esmodule_stage::InjectEsModuleStage;
pub use skip_assets_stage::SkipAssetsStage;
pub use commonjs_stage::CommonJsStage;
pub use amd_custom_stage::AmdCustomStage;
pub use node_polyfills_stage::NodePolyfillsStage;
pub use json_stage::JsonStage;
pub use node_resolve_stage::NodeResolveStage;
pub use pnpm_resolve_stage::PnpmResolveStage;
pub use dynamic_imports_stage::DynamicImportsStage;

/// `./x`, `../x`, `.` and `..`
pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// JavaScript string literal for `value`
pub fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
