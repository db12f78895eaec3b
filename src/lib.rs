// ui5-modules: npm packages as sap.ui.define modules
// Library root shared by the CLI binary and the integration tests

pub mod cli;
pub mod config;
pub mod core;
pub mod infrastructure;
pub mod stages;
pub mod utils;

pub use crate::config::{ConfigLoader, ModulesConfig};
pub use crate::core::{CacheEntry, ListOptions, Resolution, ResourceConfig, ResourceOptions, ResourceService};
pub use crate::infrastructure::{ModuleResolver, ResourceLister};
pub use crate::utils::{ModulesError, Result};
