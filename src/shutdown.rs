use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

/// Operator interrupt flag shared between the signal handler and the session
///
/// Cloning is cheap; every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    /// Creates a flag in the "running" state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Returns true once shutdown was requested
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// How waiting on the session task ended
#[derive(Debug)]
pub enum WaitOutcome<T> {
    /// The task returned (or panicked)
    Finished(Result<T, JoinError>),
    /// A second signal arrived before the task noticed the first one
    Forced,
}

/// Waits for `task`, turning the first signal into a shutdown request
///
/// `signal` is called once per wait; in production it is
/// `tokio::signal::ctrl_c`. A second signal while the task is still
/// winding down (a model download, say) gives up on it.
pub async fn wait_for_session<T, S, F>(
    mut task: JoinHandle<T>,
    shutdown: &Shutdown,
    mut signal: S,
) -> WaitOutcome<T>
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        joined = &mut task => return WaitOutcome::Finished(joined),
        _ = signal() => {}
    }

    info!("shutdown signal received");
    shutdown.request();

    tokio::select! {
        joined = &mut task => WaitOutcome::Finished(joined),
        _ = signal() => {
            warn!("second shutdown signal, not waiting for the session");
            WaitOutcome::Forced
        }
    }
}
