// Infrastructure layer
pub mod bundler;
pub mod classifier;
pub mod file_system;
pub mod node_resolver;
pub mod resource_lister;
pub mod runtime;
pub mod scanner;

pub use bundler::*;
pub use classifier::*;
pub use file_system::*;
pub use node_resolver::*;
pub use resource_lister::*;
