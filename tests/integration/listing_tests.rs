use crate::support::Project;
use ui5_modules::core::models::ListOptions;
use ui5_modules::{ModulesError, ResourceLister};

fn chart_project() -> Project {
    let project = Project::new();
    project.package(
        "chart.js",
        r#"{ "name": "chart.js", "main": "dist/chart.js" }"#,
        &[
            ("dist/chart.js", ""),
            ("dist/chart.js.map", ""),
            ("dist/helpers/index.js", ""),
            ("dist/helpers/index.js.map", ""),
            ("README.md", ""),
        ],
    );
    project
}

#[test]
fn test_lists_all_package_files_sorted() {
    let project = chart_project();
    let lister = ResourceLister::new(project.resolver());

    let resources = lister
        .list_resources("chart.js", &ListOptions::new(&project.root))
        .unwrap();
    assert_eq!(
        resources,
        vec![
            "chart.js/README.md",
            "chart.js/dist/chart.js",
            "chart.js/dist/chart.js.map",
            "chart.js/dist/helpers/index.js",
            "chart.js/dist/helpers/index.js.map",
            "chart.js/package.json",
        ]
    );
}

#[test]
fn test_ignore_globs_filter_listing() {
    let project = chart_project();
    let lister = ResourceLister::new(project.resolver());
    let mut options = ListOptions::new(&project.root);
    options.ignore = vec!["**/*.map".to_string(), "*.md".to_string()];

    let resources = lister.list_resources("chart.js", &options).unwrap();
    assert_eq!(
        resources,
        vec![
            "chart.js/dist/chart.js",
            "chart.js/dist/helpers/index.js",
            "chart.js/package.json",
        ]
    );
}

#[test]
fn test_package_ignore_file_is_honoured() {
    let project = chart_project();
    project.write("node_modules/chart.js/.ignore", "helpers/\n*.map\n");
    let lister = ResourceLister::new(project.resolver());

    let resources = lister
        .list_resources("chart.js", &ListOptions::new(&project.root))
        .unwrap();
    assert_eq!(
        resources,
        vec![
            "chart.js/.ignore",
            "chart.js/README.md",
            "chart.js/dist/chart.js",
            "chart.js/package.json",
        ]
    );
}

#[test]
fn test_unknown_package_is_an_error() {
    let project = chart_project();
    let lister = ResourceLister::new(project.resolver());

    let err = lister
        .list_resources("no-such-package", &ListOptions::new(&project.root))
        .unwrap_err();
    assert!(matches!(err, ModulesError::PackageNotFound(ref name) if name == "no-such-package"));
    assert_eq!(err.to_string(), "NPM package no-such-package not found. Ignoring package...");
}
