use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global fmt subscriber. `RUST_LOG` takes precedence over the
    /// verbose flag.
    pub fn init(verbose: bool) {
        let default_directive = if verbose {
            "ui5_modules=debug"
        } else {
            "ui5_modules=info"
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        // A host may already have installed a subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn resolving(specifier: &str, main_fields: &[String]) {
        debug!("Resolving {} [{}]...", specifier, main_fields.join(","));
    }

    pub fn resolved(path: &std::path::Path) {
        debug!("  => found at {}", path.display());
    }

    pub fn not_resolved() {
        debug!("  => not found!");
    }

    pub fn bundle_chunks(specifier: &str, count: usize) {
        info!("The bundle for {} has {} chunks!", specifier, count);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
