//! Retrying puller — exponential backoff bounded by attempts and a deadline.
//!
//! Before every attempt the puller waits, starting at the policy's
//! `initial_wait` and doubling each time. The wait is raced against the
//! overall deadline; when the deadline wins the whole pull stops. Failed
//! attempts are reported on the progress sink so a caller tailing the
//! stream sees retries inline with the pull output.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use keel_core::{Image, RetryPolicy};

use crate::error::{PullError, PullResult};
use crate::message::{JsonMessage, write_message};
use crate::puller::Puller;

/// Wraps a [`Puller`] and retries every failure until the policy's
/// attempts or deadline run out.
pub struct RetryPuller<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: Puller> RetryPuller<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.policy.max_attempts != 0 && attempts >= self.policy.max_attempts
    }

    /// What to return once the deadline fires.
    fn deadline_error(&self, last: Option<PullError>) -> PullError {
        last.unwrap_or(PullError::DeadlineExceeded(self.policy.deadline))
    }
}

/// Sleep for `wait`, or until `deadline` if that comes first.
///
/// Returns false when the deadline fired.
async fn wait_within(wait: Duration, deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) => tokio::select! {
            biased;
            _ = sleep_until(deadline) => false,
            _ = sleep(wait) => true,
        },
        None => {
            sleep(wait).await;
            true
        }
    }
}

#[async_trait]
impl<P: Puller> Puller for RetryPuller<P> {
    async fn pull(&self, image: &Image, out: &mut (dyn Write + Send)) -> PullResult<()> {
        // A deadline too far out to represent is no deadline at all.
        let deadline = self
            .policy
            .has_deadline()
            .then(|| Instant::now().checked_add(self.policy.deadline))
            .flatten();
        let mut wait = self.policy.first_wait();
        let mut attempts: u32 = 0;
        let mut last_err: Option<PullError> = None;

        loop {
            if !wait_within(wait, deadline).await {
                warn!(%image, attempts, deadline = ?self.policy.deadline, "pull deadline reached");
                return Err(self.deadline_error(last_err));
            }
            wait = wait.saturating_mul(2);
            attempts += 1;

            debug!(%image, attempt = attempts, "pulling image");
            let result = match deadline {
                Some(deadline) => match timeout_at(deadline, self.inner.pull(image, out)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(%image, attempt = attempts, "pull deadline reached mid-attempt");
                        return Err(self.deadline_error(last_err));
                    }
                },
                None => self.inner.pull(image, out).await,
            };

            let err = match result {
                Ok(()) => {
                    if attempts > 1 {
                        info!(%image, attempts, "image pulled after retrying");
                    }
                    return Ok(());
                }
                Err(err) => err,
            };

            if self.exhausted(attempts) {
                warn!(%image, attempts, error = %err, "giving up on image pull");
                return Err(err);
            }

            warn!(%image, attempt = attempts, error = %err, retry_in = ?wait, "pull failed");
            let notice = JsonMessage::status(format!("{err}. Retrying in {wait:?}"));
            if let Err(e) = write_message(out, &notice) {
                warn!(%image, error = %e, "failed to write retry notice");
            }
            last_err = Some(err);
        }
    }
}
