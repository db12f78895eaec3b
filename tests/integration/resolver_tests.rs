use crate::support::Project;
use std::path::PathBuf;
use ui5_modules::core::models::{Resolution, ResolveContext, UnresolvedReason};
use ui5_modules::infrastructure::ModuleResolver;

fn found(resolution: Resolution) -> PathBuf {
    match resolution {
        Resolution::Found(path) => path,
        other => panic!("expected a path, got {:?}", other),
    }
}

#[test]
fn test_manifest_fields_follow_priority() {
    let project = Project::new();
    let dir = project.package(
        "dual",
        r#"{ "name": "dual", "main": "dist/index.cjs", "module": "dist/index.mjs" }"#,
        &[("dist/index.cjs", "module.exports = {};"), ("dist/index.mjs", "export {};")],
    );
    let resolver = project.resolver();

    let context = ResolveContext::new(&project.root);
    assert_eq!(found(resolver.resolve("dual", &context)), dir.join("dist/index.mjs"));

    let context = ResolveContext::new(&project.root)
        .with_main_fields(vec!["main".to_string(), "module".to_string()]);
    assert_eq!(found(resolver.resolve("dual", &context)), dir.join("dist/index.cjs"));
}

#[test]
fn test_browser_field_wins_by_default() {
    let project = Project::new();
    let dir = project.package(
        "isomorphic",
        r#"{ "name": "isomorphic", "main": "node.js", "browser": "browser.js" }"#,
        &[("node.js", ""), ("browser.js", "")],
    );

    let resolved = project
        .resolver()
        .resolve("isomorphic", &ResolveContext::new(&project.root));
    assert_eq!(found(resolved), dir.join("browser.js"));
}

#[test]
fn test_subpath_through_exports_map() {
    let project = Project::new();
    let dir = project.package(
        "@scope/kit",
        r#"{
            "name": "@scope/kit",
            "exports": {
                ".": { "require": "./lib/main.js", "default": "./lib/main.mjs" },
                "./helpers/*": { "require": "./lib/helpers/*.js" }
            }
        }"#,
        &[
            ("lib/main.js", ""),
            ("lib/main.mjs", ""),
            ("lib/helpers/format.js", ""),
        ],
    );
    let resolver = project.resolver();
    let context = ResolveContext::new(&project.root);

    assert_eq!(found(resolver.resolve("@scope/kit", &context)), dir.join("lib/main.js"));
    assert_eq!(
        found(resolver.resolve("@scope/kit/helpers/format", &context)),
        dir.join("lib/helpers/format.js")
    );
    // the manifest stays addressable although `exports` does not list it
    assert_eq!(
        found(resolver.resolve("@scope/kit/package.json", &context)),
        dir.join("package.json")
    );
}

#[test]
fn test_dep_paths_extend_lookup() {
    let project = Project::new();
    project.write(
        "shared/node_modules/common/package.json",
        r#"{ "name": "common", "main": "common.js" }"#,
    );
    let common = project.write("shared/node_modules/common/common.js", "");
    let resolver = project.resolver();

    let plain = ResolveContext::new(&project.root);
    assert_eq!(
        resolver.resolve("common", &plain),
        Resolution::Unresolved(UnresolvedReason::NotFound)
    );

    resolver.clear_negative_cache();
    let extended = ResolveContext::new(&project.root).with_dep_paths(vec![project.root.join("shared")]);
    assert_eq!(found(resolver.resolve("common", &extended)), common);
}

#[test]
fn test_relative_specifiers_are_rejected() {
    let project = Project::new();
    let resolver = project.resolver();

    assert_eq!(
        resolver.resolve("./local", &ResolveContext::new(&project.root)),
        Resolution::Unresolved(UnresolvedReason::Relative)
    );
    assert_eq!(resolver.lookup_count(), 0);
}

#[test]
fn test_broken_app_manifest_fails() {
    let project = Project::new();
    project.write("package.json", "{ not json");

    let resolution = project
        .resolver()
        .resolve("anything", &ResolveContext::new(&project.root));
    assert!(matches!(resolution, Resolution::Failed(_)));
}

#[test]
fn test_default_root_is_last_resort() {
    let fallback = Project::new();
    let dir = fallback.package("tool", r#"{ "name": "tool", "main": "tool.js" }"#, &[("tool.js", "")]);
    let consumer = Project::new();

    let resolver = ModuleResolver::with_default_root(&fallback.root);
    let resolved = resolver.resolve("tool", &ResolveContext::new(&consumer.root));
    assert_eq!(found(resolved), dir.join("tool.js"));
}

#[cfg(unix)]
#[test]
fn test_pnpm_symlinks_resolve_to_store() {
    let project = Project::new();
    let store = project.root.join("node_modules/.pnpm/linked@1.0.0/node_modules/linked");
    project.write(
        "node_modules/.pnpm/linked@1.0.0/node_modules/linked/package.json",
        r#"{ "name": "linked", "main": "index.js" }"#,
    );
    project.write("node_modules/.pnpm/linked@1.0.0/node_modules/linked/index.js", "");
    std::os::unix::fs::symlink(&store, project.root.join("node_modules/linked")).unwrap();

    let resolved = project
        .resolver()
        .resolve("linked", &ResolveContext::new(&project.root));
    assert_eq!(found(resolved), store.join("index.js"));
}
