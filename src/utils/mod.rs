// Shared utilities module
pub mod errors;
pub mod logging;
pub mod patterns;

pub use errors::*;
pub use logging::*;
pub use patterns::*;
