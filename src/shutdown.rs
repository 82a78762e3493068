//! # Shutdown Coordination
//!
//! Components that acquire an external resource register a cleanup callback
//! here. The callbacks run once, in reverse registration order, either at the
//! end of a normal run or on the fatal path right before the process exits.

use parking_lot::Mutex;
use std::fmt::Display;
use tracing::{debug, error};

type Cleanup = Box<dyn FnOnce() + Send>;

/// Registry of cleanup callbacks
#[derive(Default)]
pub struct ShutdownCoordinator {
    cleanups: Mutex<Vec<(String, Cleanup)>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback to run on shutdown
    pub fn register<F>(&self, name: impl Into<String>, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        debug!("Registered shutdown cleanup: {}", name);
        self.cleanups.lock().push((name, Box::new(cleanup)));
    }

    /// Number of callbacks still pending
    pub fn pending(&self) -> usize {
        self.cleanups.lock().len()
    }

    /// Run and drop every registered callback, newest first
    pub fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        for (name, cleanup) in cleanups.into_iter().rev() {
            debug!("Running shutdown cleanup: {}", name);
            cleanup();
        }
    }

    /// Log a fatal error, release external resources and exit with status 1
    pub fn fatal<E: Display>(&self, err: E) -> ! {
        error!("{}", err);
        self.run_cleanups();
        std::process::exit(1)
    }
}
