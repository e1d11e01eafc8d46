//! Shared handles that become ready asynchronously.
//!
//! A database handle is opened in the background while requests may already
//! be arriving. Callers `acquire` the handle: they get it as soon as it is
//! published, or `Error::NotReady` once the polling budget is spent.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::Error;

/// Bounded attempts with a fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// Waiting for a handle another task is still opening (5 × 300 ms).
    pub const fn acquire() -> Self {
        Self::new(5, Duration::from_millis(300))
    }

    /// Opening a store: first try plus 3 retries, 500 ms apart.
    pub const fn open() -> Self {
        Self::new(4, Duration::from_millis(500))
    }

    /// Store writes in the media cache paths.
    pub const fn write() -> Self {
        Self::new(3, Duration::from_millis(300))
    }

    /// Upper bound on the time spent waiting between attempts.
    pub fn budget(&self) -> Duration {
        self.backoff * self.attempts
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted.
///
/// Returns the last error when every attempt fails.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, attempts, error = %e, "{what} failed, retrying");
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempts, error = %e, "{what} failed, giving up");
                return Err(e);
            }
        }
    }
}

/// A slot that is empty until its resource has been initialised.
#[derive(Debug, Clone)]
pub struct ReadyHandle<T: Clone> {
    name: &'static str,
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone + Send + Sync + 'static> ReadyHandle<T> {
    /// An empty handle; `name` is used in logs and timeout errors.
    pub fn new(name: &'static str) -> Self {
        let (tx, _) = watch::channel(None);
        Self { name, tx }
    }

    /// A handle that is already ready.
    pub fn ready(name: &'static str, value: T) -> Self {
        let handle = Self::new(name);
        handle.publish(value);
        handle
    }

    /// Make the resource available to every current and future waiter.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
        tracing::debug!(handle = self.name, "handle ready");
    }

    /// Drop the resource (e.g. after the connection closed).
    #[cfg(test)]
    pub(crate) fn reset(&self) {
        self.tx.send_replace(None);
    }

    /// The resource, if it is ready right now.
    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Wait up to the policy's budget for the resource.
    pub async fn acquire(&self, policy: RetryPolicy) -> Result<T, Error> {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        tracing::debug!(handle = self.name, attempts = policy.attempts, "waiting for handle");
        let mut rx = self.tx.subscribe();
        match tokio::time::timeout(policy.budget(), rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => value.clone().ok_or_else(|| Error::NotReady(self.name.to_string())),
            _ => {
                tracing::error!(handle = self.name, "handle not ready in time");
                Err(Error::NotReady(format!("{} not ready after {:?}", self.name, policy.budget())))
            }
        }
    }

    /// Initialise the resource with bounded retries and publish it.
    pub async fn open_with_retry<F, Fut>(&self, policy: RetryPolicy, open: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let value = retry(policy, self.name, open).await?;
        self.publish(value.clone());
        Ok(value)
    }
}
