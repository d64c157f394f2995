//! Retry wrapper around the database connection.
//!
//! [`SqlRetry`] owns the live [`Connection`] and runs every engine query
//! through [`SqlRetry::with_retries`]. Errors whose kind and message match a
//! [`RetryRule`] are retried on the policy's backoff schedule; anything else,
//! and anything still failing once the attempt or time budget runs out, is
//! returned unchanged.
//!
//! The server identity (`host:port`) is captured when the wrapper is built.
//! After an error that may have re-established the session, the next attempt
//! first checks that the session still points at that server. A different
//! server fails the attempt with [`CopyError::HostDivergence`], which the
//! default rules retry, so the copy never silently continues against another
//! machine.

mod policy;

pub use policy::{default_rules, RetryOverrides, RetryPolicy, RetryRule};

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::{Connection, SqlWarning};
use crate::error::{CopyError, Result};

use policy::requires_host_check;

/// Log prefix used when a call does not name one.
pub const DEFAULT_LOG_PREFIX: &str = "SQL Retry";

/// Details handed to the retry hook.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    pub log_prefix: &'a str,
    pub error: &'a CopyError,
    /// Attempt that just failed (1-based).
    pub attempt: u32,
    /// Time since the first attempt started.
    pub elapsed: Duration,
    /// Wait before the next attempt.
    pub next_interval: Duration,
}

/// Observer called before every retry. It cannot influence the decision.
pub type RetryHook = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// Per-call options for the query helpers.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions<'a> {
    pub should_retry: bool,
    pub log_prefix: &'a str,
}

impl<'a> QueryOptions<'a> {
    /// Retry transient failures, logging under `log_prefix`.
    pub fn retried(log_prefix: &'a str) -> Self {
        Self {
            should_retry: true,
            log_prefix,
        }
    }

    /// Run once; errors go straight back to the caller.
    pub fn once(log_prefix: &'a str) -> Self {
        Self {
            should_retry: false,
            log_prefix,
        }
    }
}

/// Connection plus retry policy.
pub struct SqlRetry<C> {
    connection: C,
    policy: RetryPolicy,
    initial_host: Option<String>,
    on_retry: Option<RetryHook>,
}

impl<C: Connection> SqlRetry<C> {
    /// Wrap a connection, recording which server it is talking to.
    pub async fn new(mut connection: C, policy: RetryPolicy) -> Result<Self> {
        let initial_host = connection.server_identity().await?;
        debug!("[{}] connected to {:?}", DEFAULT_LOG_PREFIX, initial_host);

        Ok(Self {
            connection,
            policy,
            initial_host,
            on_retry: None,
        })
    }

    /// Replace the default retry logging with a custom hook.
    pub fn with_on_retry(mut self, hook: RetryHook) -> Self {
        self.on_retry = Some(hook);
        self
    }

    /// Fold `overrides` into the instance policy so every call sees them.
    pub fn with_overrides(mut self, overrides: &RetryOverrides) -> Self {
        self.policy = self.policy.merge(overrides);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Server identity captured at construction.
    pub fn initial_host(&self) -> Option<&str> {
        self.initial_host.as_deref()
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn into_inner(self) -> C {
        self.connection
    }

    /// Run `op` against the connection, retrying per policy.
    ///
    /// `op` is called once per attempt with the live connection, so every
    /// attempt sees fresh session state. Values the operation needs must be
    /// moved into the returned future.
    pub async fn with_retries<T, F>(&mut self, overrides: &RetryOverrides, mut op: F) -> Result<T>
    where
        F: for<'c> FnMut(&'c mut C) -> BoxFuture<'c, Result<T>>,
    {
        let policy = self.policy.merge(overrides);
        let log_prefix = overrides
            .log_prefix
            .as_deref()
            .unwrap_or(DEFAULT_LOG_PREFIX);
        let started = Instant::now();
        let mut attempt = 0u32;
        let mut check_host = false;

        loop {
            attempt += 1;

            let result = if check_host {
                match self.verify_host().await {
                    Ok(()) => op(&mut self.connection).await,
                    Err(e) => Err(e),
                }
            } else {
                op(&mut self.connection).await
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= policy.tries || !policy.is_retryable(&error) {
                return Err(error);
            }

            let next_interval = policy.next_interval(attempt);
            let elapsed = started.elapsed();
            if let Some(max_elapsed) = policy.max_elapsed_time {
                if elapsed + next_interval > max_elapsed {
                    return Err(error);
                }
            }

            self.notify_retry(&RetryEvent {
                log_prefix,
                error: &error,
                attempt,
                elapsed,
                next_interval,
            });

            check_host = requires_host_check(&error);
            tokio::time::sleep(next_interval).await;
        }
    }

    pub async fn select_value(&mut self, sql: &str, opts: QueryOptions<'_>) -> Result<Option<i64>> {
        if !opts.should_retry {
            return self.connection.select_value(sql).await;
        }
        let sql = sql.to_string();
        self.with_retries(&RetryOverrides::with_prefix(opts.log_prefix), |conn| {
            let sql = sql.clone();
            Box::pin(async move { conn.select_value(&sql).await })
        })
        .await
    }

    pub async fn select_values(&mut self, sql: &str, opts: QueryOptions<'_>) -> Result<Vec<i64>> {
        if !opts.should_retry {
            return self.connection.select_values(sql).await;
        }
        let sql = sql.to_string();
        self.with_retries(&RetryOverrides::with_prefix(opts.log_prefix), |conn| {
            let sql = sql.clone();
            Box::pin(async move { conn.select_values(&sql).await })
        })
        .await
    }

    pub async fn update(&mut self, sql: &str, opts: QueryOptions<'_>) -> Result<u64> {
        if !opts.should_retry {
            return self.connection.update(sql).await;
        }
        let sql = sql.to_string();
        self.with_retries(&RetryOverrides::with_prefix(opts.log_prefix), |conn| {
            let sql = sql.clone();
            Box::pin(async move { conn.update(&sql).await })
        })
        .await
    }

    pub async fn show_warnings(&mut self, opts: QueryOptions<'_>) -> Result<Vec<SqlWarning>> {
        if !opts.should_retry {
            return self.connection.show_warnings().await;
        }
        self.with_retries(&RetryOverrides::with_prefix(opts.log_prefix), |conn| {
            Box::pin(async move { conn.show_warnings().await })
        })
        .await
    }

    async fn verify_host(&mut self) -> Result<()> {
        let Some(initial) = self.initial_host.as_deref() else {
            return Ok(());
        };

        let current = self.connection.server_identity().await?;
        match current {
            Some(current) if current != initial => Err(CopyError::HostDivergence {
                initial: initial.to_string(),
                current,
            }),
            _ => Ok(()),
        }
    }

    fn notify_retry(&self, event: &RetryEvent<'_>) {
        match &self.on_retry {
            Some(hook) => hook(event),
            None => info!(
                "[{}] {:?}: '{}' - {} tries in {:.3} seconds and {:.3} seconds until the next try.",
                event.log_prefix,
                event.error.kind(),
                event.error,
                event.attempt,
                event.elapsed.as_secs_f64(),
                event.next_interval.as_secs_f64()
            ),
        }
    }
}
