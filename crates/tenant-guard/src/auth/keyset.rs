//! Background key-set actor
//!
//! A [`KeySetActor`] owns the signing keys of one issuer. A dedicated tokio
//! task holds the current [`KeySet`] and is reached only through a bounded
//! mailbox; every request carries a oneshot reply channel. The task refreshes
//! the keys on a timer and on demand, runs at most one fetch at a time and
//! keeps answering reads while a fetch is in flight.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Fuse, FusedFuture};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::error::{AuthError, Result};
use super::jwks::{JwkSet, KeySet, KeySetFetcher};
use crate::constants::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_KEY_REFRESH_INTERVAL, KEYSET_MAILBOX_CAPACITY,
};

/// Tuning for a [`KeySetActor`].
#[derive(Debug, Clone, Copy)]
pub struct KeySetOptions {
    /// Period of background refreshes.
    pub refresh_interval: Duration,
    /// Upper bound for a single fetch, including the initial one.
    pub fetch_timeout: Duration,
    pub mailbox_capacity: usize,
}

impl Default for KeySetOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_KEY_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            mailbox_capacity: KEYSET_MAILBOX_CAPACITY,
        }
    }
}

impl KeySetOptions {
    /// Both durations must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(AuthError::Config(
                "key set refresh interval must be greater than zero".into(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(AuthError::Config(
                "key set fetch timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

enum Command {
    Snapshot {
        reply: oneshot::Sender<Arc<KeySet>>,
    },
    /// Answered with the first key set newer than `seen`, or with the current
    /// one if the fetch started for it fails.
    Refresh {
        seen: u64,
        reply: oneshot::Sender<Arc<KeySet>>,
    },
}

type FetchFuture = Fuse<BoxFuture<'static, Result<JwkSet>>>;

/// Handle to a running key-set task. Dropping the handle stops the task.
pub struct KeySetActor {
    mailbox: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    endpoint: String,
}

impl std::fmt::Debug for KeySetActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetActor")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl KeySetActor {
    /// Fetch the initial key set and start the actor.
    ///
    /// Fails if the first fetch fails or does not finish within
    /// `fetch_timeout`; an actor never starts without keys. Zero intervals
    /// are rejected with [`AuthError::Config`].
    pub async fn spawn<F>(fetcher: F, options: KeySetOptions) -> Result<Self>
    where
        F: KeySetFetcher + 'static,
    {
        options.validate()?;
        let fetcher: Arc<dyn KeySetFetcher> = Arc::new(fetcher);
        let endpoint = fetcher.endpoint().to_string();

        let jwks = fetch_with_timeout(Arc::clone(&fetcher), options.fetch_timeout).await?;
        let initial = KeySet::from_jwks(&jwks, 1)?;
        tracing::info!(jwks_uri = %endpoint, keys_count = initial.len(), "Key set loaded");

        let (tx, rx) = mpsc::channel(options.mailbox_capacity.max(1));
        let shutdown = CancellationToken::new();

        let task = KeySetTask {
            fetcher,
            current: Arc::new(initial),
            options,
            waiters: Vec::new(),
        };
        tokio::spawn(task.run(rx, shutdown.clone()));

        Ok(Self {
            mailbox: tx,
            shutdown,
            endpoint,
        })
    }

    /// The key set currently held by the actor.
    pub async fn snapshot(&self) -> Result<Arc<KeySet>> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Force a refresh unless a key set newer than `seen` revision already
    /// exists, and return the resulting set.
    ///
    /// Concurrent callers share one fetch.
    pub async fn refresh_after(&self, seen: u64) -> Result<Arc<KeySet>> {
        self.request(|reply| Command::Refresh { seen, reply }).await
    }

    /// Force a refresh of the current key set.
    pub async fn refresh(&self) -> Result<Arc<KeySet>> {
        let seen = self.snapshot().await?.revision();
        self.refresh_after(seen).await
    }

    /// Resolve the verification key for `kid`.
    ///
    /// A miss forces exactly one refresh before failing with
    /// [`AuthError::KeyNotFound`]. A key that does not match `alg` fails with
    /// [`AuthError::NoMatchingKey`].
    pub async fn key(&self, kid: &str, alg: Algorithm) -> Result<DecodingKey> {
        let mut keys = self.snapshot().await?;
        if keys.get(kid).is_none() {
            tracing::debug!(kid, jwks_uri = %self.endpoint, "Key not cached, forcing refresh");
            keys = self.refresh_after(keys.revision()).await?;
        }

        let entry = keys
            .get(kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))?;
        if !entry.supports(alg) {
            return Err(AuthError::NoMatchingKey);
        }
        Ok(entry.key().clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the background task. Pending and later calls fail with
    /// [`AuthError::KeySetClosed`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Arc<KeySet>>) -> Command,
    ) -> Result<Arc<KeySet>> {
        if self.shutdown.is_cancelled() {
            return Err(self.closed());
        }
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(command(reply))
            .await
            .map_err(|_| self.closed())?;
        response.await.map_err(|_| self.closed())
    }

    fn closed(&self) -> AuthError {
        AuthError::KeySetClosed(self.endpoint.clone())
    }
}

impl Drop for KeySetActor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct KeySetTask {
    fetcher: Arc<dyn KeySetFetcher>,
    current: Arc<KeySet>,
    options: KeySetOptions,
    waiters: Vec<oneshot::Sender<Arc<KeySet>>>,
}

impl KeySetTask {
    async fn run(mut self, mut mailbox: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        let period = self.options.refresh_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut fetch: FetchFuture = Fuse::terminated();

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    tracing::debug!(jwks_uri = %self.fetcher.endpoint(), "Key set task shutting down");
                    break;
                }
                result = &mut fetch, if !fetch.is_terminated() => {
                    self.apply(result);
                }
                command = mailbox.recv() => match command {
                    Some(Command::Snapshot { reply }) => {
                        let _ = reply.send(Arc::clone(&self.current));
                    }
                    Some(Command::Refresh { seen, reply }) => {
                        if self.current.revision() > seen {
                            let _ = reply.send(Arc::clone(&self.current));
                        } else {
                            self.waiters.push(reply);
                            if fetch.is_terminated() {
                                fetch = self.start_fetch();
                            }
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if fetch.is_terminated() {
                        fetch = self.start_fetch();
                    }
                }
            }
        }

        // Dropping the receiver and the queued reply senders wakes every
        // caller with a closed-channel error.
        mailbox.close();
    }

    fn start_fetch(&self) -> FetchFuture {
        fetch_with_timeout(Arc::clone(&self.fetcher), self.options.fetch_timeout)
            .boxed()
            .fuse()
    }

    fn apply(&mut self, result: Result<JwkSet>) {
        let endpoint = self.fetcher.endpoint();
        let decoded =
            result.and_then(|jwks| KeySet::from_jwks(&jwks, self.current.revision() + 1));
        match decoded {
            Ok(keys) => {
                tracing::debug!(
                    jwks_uri = %endpoint,
                    keys_count = keys.len(),
                    revision = keys.revision(),
                    "Key set refreshed"
                );
                self.current = Arc::new(keys);
                #[cfg(feature = "metrics")]
                crate::observability::record_keyset_refresh("success");
            }
            Err(e) => {
                tracing::warn!(jwks_uri = %endpoint, error = %e, "Key set refresh failed, keeping previous keys");
                #[cfg(feature = "metrics")]
                crate::observability::record_keyset_refresh("error");
            }
        }

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Arc::clone(&self.current));
        }
    }
}

async fn fetch_with_timeout(fetcher: Arc<dyn KeySetFetcher>, timeout: Duration) -> Result<JwkSet> {
    match tokio::time::timeout(timeout, fetcher.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(AuthError::KeySetFetch {
            url: fetcher.endpoint().to_string(),
            reason: format!("timed out after {timeout:?}"),
        }),
    }
}
