//! Background production of neighboring tab content.
//!
//! The cache never calls a content producer on the caller's thread while
//! preloading. Work is packaged as a [`PreloadJob`] and handed to a
//! [`PreloadExecutor`], which decides where it runs.

use std::error::Error;
use std::thread;

/// Boxed error returned by preload sources.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A tab whose content can be produced outside of the hook pipeline.
pub trait PreloadSource: Send + Sync {
    /// Tab identifier.
    fn id(&self) -> &str;

    /// Whether the tab is disabled. Disabled tabs are never preloaded.
    fn is_disabled(&self) -> bool;

    /// Produce the tab's rendered content.
    ///
    /// # Errors
    ///
    /// Returns the producer's failure. Preloading logs it and moves on.
    fn produce(&self) -> Result<String, BoxError>;
}

/// Unit of work scheduled by a preload.
pub type PreloadJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs preload jobs without blocking the scheduling caller.
pub trait PreloadExecutor: Send + Sync {
    /// Run `job` at some later point.
    fn execute(&self, job: PreloadJob);
}

/// Executor that runs each job on its own named thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl PreloadExecutor for ThreadExecutor {
    fn execute(&self, job: PreloadJob) {
        let spawned = thread::Builder::new()
            .name("tabs-preload".to_owned())
            .spawn(job);
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to spawn preload thread");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_thread_executor_runs_job_off_caller_thread() {
        let (tx, rx) = mpsc::channel();
        ThreadExecutor.execute(Box::new(move || {
            let name = thread::current().name().map(str::to_owned);
            tx.send(name).unwrap();
        }));

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("tabs-preload"));
    }
}
