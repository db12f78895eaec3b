use crate::support::{touch_later, CountingBundler, Project};
use std::sync::Arc;
use ui5_modules::core::models::{
    fallback_main_fields, ResourceConfig, ResourceOptions, SkipTransform,
};

const LIB_MANIFEST: &str = r#"{ "name": "lib", "version": "1.0.0", "main": "index.js" }"#;

fn lib_project() -> Project {
    let project = Project::new();
    project.package("lib", LIB_MANIFEST, &[("index.js", "module.exports = 42;\n")]);
    project
}

#[tokio::test]
async fn test_cache_hit_is_idempotent() {
    let project = lib_project();
    let bundler = CountingBundler::new();
    let (service, _) = project.service(bundler.clone());
    let options = ResourceOptions::new(&project.root);
    let config = ResourceConfig::default();

    let first = service.get_resource("lib", &config, &options).await.unwrap();
    let second = service.get_resource("lib", &config, &options).await.unwrap();

    assert_eq!(bundler.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.code.starts_with("sap.ui.define("));
    assert!(!first.is_passthrough());
}

#[tokio::test]
async fn test_modified_source_is_rebundled() {
    let project = lib_project();
    let bundler = CountingBundler::new();
    let (service, _) = project.service(bundler.clone());
    let options = ResourceOptions::new(&project.root);
    let config = ResourceConfig::default();

    let first = service.get_resource("lib", &config, &options).await.unwrap();
    touch_later(&project.root.join("node_modules/lib/index.js"), 60);
    let second = service.get_resource("lib", &config, &options).await.unwrap();

    assert_eq!(bundler.calls(), 2);
    assert!(second.last_modified > first.last_modified);
}

#[tokio::test]
async fn test_unresolvable_specifier_is_looked_up_once() {
    let project = lib_project();
    let bundler = CountingBundler::new();
    let (service, resolver) = project.service(bundler.clone());
    let options = ResourceOptions::new(&project.root);
    let config = ResourceConfig::default();

    assert!(service.get_resource("does-not-exist", &config, &options).await.is_none());
    let lookups = resolver.lookup_count();
    assert!(resolver.is_known_missing("does-not-exist"));

    assert!(service.get_resource("does-not-exist", &config, &options).await.is_none());
    assert_eq!(resolver.lookup_count(), lookups);
    assert_eq!(bundler.calls(), 0);

    // installing the package later needs an explicit reset
    project.package(
        "does-not-exist",
        r#"{ "name": "does-not-exist", "main": "index.js" }"#,
        &[("index.js", "module.exports = 1;\n")],
    );
    assert!(service.get_resource("does-not-exist", &config, &options).await.is_none());
    assert!(resolver.forget("does-not-exist"));
    assert!(service.get_resource("does-not-exist", &config, &options).await.is_some());
}

#[tokio::test]
async fn test_failed_bundle_retries_with_commonjs_field_order() {
    let project = lib_project();
    let bundler = CountingBundler::failing_primary();
    let (service, _) = project.service(bundler.clone());
    let options = ResourceOptions::new(&project.root);

    let entry = service
        .get_resource("lib", &ResourceConfig::default(), &options)
        .await
        .unwrap();

    assert_eq!(bundler.calls(), 2);
    let attempts = bundler.main_fields.lock().clone();
    assert_eq!(attempts[0], vec!["browser", "module", "main"]);
    assert_eq!(attempts[1], vec!["browser", "main", "module"]);
    assert_eq!(entry.code, CountingBundler::render("lib", &fallback_main_fields()));
}

#[tokio::test]
async fn test_failed_fallback_yields_nothing() {
    let project = lib_project();
    let bundler = CountingBundler::failing();
    let (service, _) = project.service(bundler.clone());
    let options = ResourceOptions::new(&project.root);

    let entry = service
        .get_resource("lib", &ResourceConfig::default(), &options)
        .await;

    assert!(entry.is_none());
    assert!(service.cached("lib").is_none());
    assert_eq!(bundler.calls(), 2);
}

#[tokio::test]
async fn test_resolved_file_missing_on_disk_yields_nothing() {
    let project = Project::new();
    let bundler = CountingBundler::new();
    let (service, _) = project.service(bundler.clone());

    // resolves to <cwd>/missing.js, which was never written
    let entry = service
        .get_resource(
            "app/missing",
            &ResourceConfig::default(),
            &ResourceOptions::new(&project.root),
        )
        .await;

    assert!(entry.is_none());
    assert!(service.cached("app/missing").is_none());
    assert_eq!(bundler.calls(), 0);
}

#[tokio::test]
async fn test_split_chunks_are_registered_and_served() {
    let project = lib_project();
    let bundler = CountingBundler::with_chunks(2);
    let (service, resolver) = project.service(bundler.clone());
    let options = ResourceOptions::new(&project.root);
    let config = ResourceConfig::default();

    let entry = service.get_resource("lib", &config, &options).await.unwrap();
    let names: Vec<String> = entry.chunks.keys().cloned().collect();
    assert_eq!(names, vec!["lib-00010000", "lib-00010001"]);

    let origin = project
        .root
        .join("node_modules/lib/index.js")
        .canonicalize()
        .unwrap();
    for name in &names {
        assert_eq!(service.chunk_origin(name), Some(origin.clone()));
    }

    let lookups = resolver.lookup_count();
    let chunk = service.get_resource(&names[1], &config, &options).await.unwrap();
    assert_eq!(chunk.code, "sap.ui.define([], function () { return 1; });");
    assert!(Arc::ptr_eq(&chunk, &entry.chunks[&names[1]]));
    assert_eq!(resolver.lookup_count(), lookups);
    assert_eq!(bundler.calls(), 1);

    touch_later(&origin, 60);
    let rebuilt = service.get_resource("lib", &config, &options).await.unwrap();
    assert_eq!(bundler.calls(), 2);
    assert_eq!(
        rebuilt.chunks.keys().cloned().collect::<Vec<_>>(),
        vec!["lib-00020000", "lib-00020001"]
    );
    for name in &names {
        assert_eq!(service.chunk_origin(name), None);
    }
    assert!(service.chunk_origin("lib-00020000").is_some());
}

#[tokio::test]
async fn test_skip_transform_glob_passes_file_through() {
    let project = lib_project();
    let bundler = CountingBundler::new();
    let (service, _) = project.service(bundler.clone());
    let mut options = ResourceOptions::new(&project.root);
    options.skip_transform = SkipTransform::Globs(vec!["lib/**".to_string()]);

    let entry = service
        .get_resource("lib/index.js", &ResourceConfig::default(), &options)
        .await
        .unwrap();

    assert_eq!(bundler.calls(), 0);
    assert!(entry.is_passthrough());
    assert_eq!(entry.code, "module.exports = 42;\n");
    assert!(entry.chunks.is_empty());
}

#[tokio::test]
async fn test_native_module_passes_through() {
    let project = Project::new();
    let source = "sap.ui.define([\"sap/m/Button\"], function (Button) {\n  return Button;\n});\n";
    project.package(
        "ui5-control",
        r#"{ "name": "ui5-control", "main": "control.js" }"#,
        &[("control.js", source)],
    );
    let bundler = CountingBundler::new();
    let (service, _) = project.service(bundler.clone());

    let entry = service
        .get_resource(
            "ui5-control",
            &ResourceConfig::default(),
            &ResourceOptions::new(&project.root),
        )
        .await
        .unwrap();

    assert_eq!(bundler.calls(), 0);
    assert_eq!(entry.code, source);
    assert!(entry.is_passthrough());
}

#[tokio::test]
async fn test_app_local_resource_uses_app_name() {
    let project = Project::new();
    project.write("util/format.js", "export const format = (v) => String(v);\n");
    let bundler = CountingBundler::new();
    let (service, _) = project.service(bundler.clone());

    let entry = service
        .get_resource(
            "app/util/format",
            &ResourceConfig::default(),
            &ResourceOptions::new(&project.root),
        )
        .await;

    assert!(entry.is_some());
    assert_eq!(bundler.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_bundle_once() {
    let project = lib_project();
    let bundler = CountingBundler::new();
    let (service, _) = project.service(bundler.clone());
    let options = ResourceOptions::new(&project.root);
    let config = ResourceConfig::default();

    let (a, b) = tokio::join!(
        service.get_resource("lib", &config, &options),
        service.get_resource("lib", &config, &options)
    );

    assert_eq!(bundler.calls(), 1);
    assert_eq!(a.unwrap().code, b.unwrap().code);
}
