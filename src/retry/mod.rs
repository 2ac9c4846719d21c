pub mod shutdown;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::select;
use tokio::time::{self, Instant};
use tracing::{debug, instrument};

use crate::config::polling::PollingConfig;

pub use self::shutdown::{Shutdown, ShutdownTrigger};

/// Outcome of a single attempt inside [`retry_until`].
#[derive(Debug)]
pub enum Attempt<E> {
    Done,
    /// Not finished yet; the reason is reported if the deadline passes.
    Retry(String),
    Fatal(E),
}

#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("{0}")]
    Fatal(E),

    #[error("timeout after {}s (last state: {last})", .waited.as_secs())]
    Timeout { waited: Duration, last: String },

    #[error("interrupted by {0}")]
    Cancelled(&'static str),
}

/// Runs `attempt` until it reports done or fatal, sleeping between attempts per `polling`.
///
/// Gives up with [`RetryError::Timeout`] once `timeout` has elapsed since the first attempt,
/// and with [`RetryError::Cancelled`] as soon as `shutdown` fires, even mid-attempt.
#[instrument("retry_until", skip_all, level = "trace", fields(timeout_secs = timeout.as_secs()))]
pub async fn retry_until<E, F, Fut>(
    timeout: Duration,
    polling: &PollingConfig,
    shutdown: &Shutdown,
    mut attempt: F,
) -> Result<(), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<E>>,
{
    let deadline = Instant::now() + timeout;
    let mut interval = polling.initial_interval;
    let mut last = String::from("no attempt finished");
    let mut attempts = 0u64;

    loop {
        if let Some(reason) = shutdown.requested() {
            return Err(RetryError::Cancelled(reason));
        }

        attempts += 1;
        let outcome = select! {
            reason = shutdown.cancelled() => return Err(RetryError::Cancelled(reason)),
            outcome = time::timeout_at(deadline, attempt()) => outcome,
        };

        match outcome {
            Ok(Attempt::Done) => {
                debug!("Finished after {} attempt(s).", attempts);
                return Ok(());
            }
            Ok(Attempt::Fatal(e)) => return Err(RetryError::Fatal(e)),
            Ok(Attempt::Retry(reason)) => {
                debug!("Attempt {} not finished: {}", attempts, reason);
                last = reason;
            }
            Err(_) => {
                return Err(RetryError::Timeout {
                    waited: timeout,
                    last,
                });
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(RetryError::Timeout {
                waited: timeout,
                last,
            });
        }

        select! {
            reason = shutdown.cancelled() => return Err(RetryError::Cancelled(reason)),
            _ = time::sleep(interval.min(deadline - now)) => {}
        }
        interval = polling.next_interval(interval);
    }
}
