// Integration tests for ui5-modules

mod support;

mod bundle_tests;
mod listing_tests;
mod resolver_tests;
mod resource_tests;
