//! Termination-signal handling.
//!
//! On SIGTERM or SIGINT (Ctrl-C elsewhere) the pipelines are shut down, the
//! outcome is logged and the process exits with code 0. Shutdown failures are
//! logged, never escalated. No timeout is applied: if shutdown never settles,
//! the process does not exit through this path.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::guard::{run_shutdown, ShutdownTarget};

/// Exit code used after a signal-driven shutdown, whatever its outcome.
pub const SHUTDOWN_EXIT_CODE: i32 = 0;

/// Registered termination-signal listeners.
///
/// Created eagerly so that a signal arriving before the waiting task is
/// first polled is not lost.
pub struct Termination {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
}

impl Termination {
    /// Install the listeners. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses the signal registration.
    pub fn listen() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                terminate: signal(SignalKind::terminate())?,
                interrupt: signal(SignalKind::interrupt())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the first termination signal and return its name.
    pub async fn recv(mut self) -> io::Result<&'static str> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.terminate.recv() => Ok("SIGTERM"),
                _ = self.interrupt.recv() => Ok("SIGINT"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok("ctrl-c")
        }
    }
}

/// Shut `target` down, log the outcome and return the exit code.
///
/// Always returns [`SHUTDOWN_EXIT_CODE`].
pub async fn shutdown_and_report(target: Arc<dyn ShutdownTarget>) -> i32 {
    match run_shutdown(target).await {
        Ok(()) => info!("SDK shut down successfully"),
        Err(e) => error!(error = %e, "Error shutting down SDK"),
    }
    SHUTDOWN_EXIT_CODE
}

/// Wait for SIGTERM or SIGINT (Ctrl-C off Unix) and return the signal name.
///
/// # Errors
///
/// Returns an error if the listeners cannot be installed.
pub async fn wait_for_termination() -> io::Result<&'static str> {
    Termination::listen()?.recv().await
}

/// Spawn the task that waits for `termination`, shuts `target` down and exits
/// the process.
pub(crate) fn spawn_exit_on_signal(
    handle: &Handle,
    termination: Termination,
    target: Arc<dyn ShutdownTarget>,
) -> JoinHandle<()> {
    handle.spawn(async move {
        if let Some(code) = shutdown_on(termination.recv(), target).await {
            std::process::exit(code);
        }
    })
}

/// Await `signal`, then shut `target` down. Returns the exit code, or `None`
/// if the listener failed and nothing was shut down.
async fn shutdown_on<F>(signal: F, target: Arc<dyn ShutdownTarget>) -> Option<i32>
where
    F: Future<Output = io::Result<&'static str>>,
{
    match signal.await {
        Ok(signal) => info!(signal, "termination signal received, shutting down telemetry"),
        Err(e) => {
            error!(error = %e, "termination signal listener failed");
            return None;
        }
    }
    Some(shutdown_and_report(target).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShutdownError;
    use crate::guard::MockShutdownTarget;
    use opentelemetry::trace::TraceError;

    #[tokio::test]
    async fn exit_code_is_zero_on_success() {
        let mut mock = MockShutdownTarget::new();
        mock.expect_shutdown().times(1).returning(|| Ok(()));
        assert_eq!(shutdown_and_report(Arc::new(mock)).await, 0);
    }

    #[tokio::test]
    async fn exit_code_is_zero_on_failure() {
        let mut mock = MockShutdownTarget::new();
        mock.expect_shutdown()
            .times(1)
            .returning(|| Err(ShutdownError::Flush(TraceError::Other("collector down".into()))));
        assert_eq!(shutdown_and_report(Arc::new(mock)).await, 0);
    }

    #[tokio::test]
    async fn listeners_install_inside_runtime() {
        assert!(Termination::listen().is_ok());
    }

    #[tokio::test]
    async fn signal_triggers_one_shutdown() {
        let mut mock = MockShutdownTarget::new();
        mock.expect_shutdown().times(1).returning(|| Ok(()));
        let code = shutdown_on(async { Ok("SIGTERM") }, Arc::new(mock)).await;
        assert_eq!(code, Some(SHUTDOWN_EXIT_CODE));
    }

    #[tokio::test]
    async fn failed_shutdown_after_signal_still_exits_zero() {
        let mut mock = MockShutdownTarget::new();
        mock.expect_shutdown()
            .times(1)
            .returning(|| Err(ShutdownError::Flush(TraceError::Other("collector down".into()))));
        let code = shutdown_on(async { Ok("SIGINT") }, Arc::new(mock)).await;
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn listener_failure_skips_shutdown() {
        let mut mock = MockShutdownTarget::new();
        mock.expect_shutdown().times(0);
        let failed = async { Err(io::Error::new(io::ErrorKind::Other, "listener gone")) };
        assert_eq!(shutdown_on(failed, Arc::new(mock)).await, None);
    }

    #[tokio::test]
    async fn no_signal_means_no_shutdown() {
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), wait_for_termination())
                .await;
        assert!(waited.is_err());
    }
}
