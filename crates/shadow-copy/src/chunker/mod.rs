//! Copy orchestration.
//!
//! [`Chunker`] drives one copy run: it pulls chunks from a
//! [`ChunkSource`], optionally asks a [`Verifier`] whether to keep going,
//! runs the chunk's [`ChunkInsert`], inspects server warnings when the insert
//! created fewer rows than expected, paces itself with the throttler and
//! reports progress to a [`Printer`].
//!
//! Runs are strictly sequential on one connection. Every error that escapes
//! the loop is handed to [`Printer::exception`] and returned unchanged; since
//! inserts use `insert ignore`, a failed run can simply be started again.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkInsert, ChunkSource};
use crate::config::CopyConfig;
use crate::core::{Connection, Migration, Printer, Throttler, Verifier};
use crate::error::{CopyError, Result};
use crate::printer::PercentagePrinter;
use crate::retry::{QueryOptions, RetryOverrides, SqlRetry};
use crate::throttler::TimeThrottler;

const LOG_PREFIX: &str = "Chunker";

/// Minimum time between two progress summaries in the log.
pub const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn duplicate_primary_key() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Duplicate entry .+ for key '(\w+\.)?PRIMARY'")
            .expect("duplicate key pattern is valid")
    })
}

/// True for the warning MySQL emits when `insert ignore` skips an existing primary key.
pub fn is_duplicate_primary_key(message: &str) -> bool {
    duplicate_primary_key().is_match(message)
}

/// Collaborators and switches for a [`Chunker`].
pub struct ChunkerOptions<C: Connection> {
    /// Paces the run after chunks that copied rows.
    pub throttler: Option<Arc<dyn Throttler>>,
    pub printer: Box<dyn Printer>,
    /// Consulted before every chunk; `false` aborts the run.
    pub verifier: Option<Arc<dyn Verifier<C>>>,
    /// Fail on warnings other than primary key duplicates.
    pub raise_on_warnings: bool,
    /// Sleep after the last chunk before returning.
    pub pause_before_switch: Option<Duration>,
    pub retry: RetryOverrides,
}

impl<C: Connection> Default for ChunkerOptions<C> {
    fn default() -> Self {
        Self {
            throttler: None,
            printer: Box::new(PercentagePrinter::new()),
            verifier: None,
            raise_on_warnings: false,
            pause_before_switch: None,
            retry: RetryOverrides::default(),
        }
    }
}

impl<C: Connection> fmt::Debug for ChunkerOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkerOptions")
            .field("throttler", &self.throttler.is_some())
            .field("verifier", &self.verifier.is_some())
            .field("raise_on_warnings", &self.raise_on_warnings)
            .field("pause_before_switch", &self.pause_before_switch)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyStats {
    /// Chunks executed.
    pub chunks: u64,
    /// Rows the inserts reported as created.
    pub rows_inserted: u64,
    pub duration: Duration,
}

impl CopyStats {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Copies the origin table into the destination chunk by chunk.
pub struct Chunker<C: Connection> {
    migration: Migration,
    db: SqlRetry<C>,
    source: ChunkSource,
    options: ChunkerOptions<C>,
}

impl<C: Connection> Chunker<C> {
    /// Build a chunker around an already loaded source.
    pub fn new(migration: Migration, db: SqlRetry<C>, source: ChunkSource, options: ChunkerOptions<C>) -> Self {
        let db = db.with_overrides(&options.retry);
        Self {
            migration,
            db,
            source,
            options,
        }
    }

    /// Build a chunker from configuration, loading the configured chunk source.
    ///
    /// Settings on `options` take precedence. Without an explicit throttler a
    /// [`TimeThrottler`] is built from `config.copy`.
    pub async fn load(
        migration: Migration,
        db: SqlRetry<C>,
        config: &CopyConfig,
        mut options: ChunkerOptions<C>,
    ) -> Result<Self> {
        let settings = &config.copy;
        let throttler = match &options.throttler {
            Some(throttler) => throttler.clone(),
            None => {
                let throttler: Arc<dyn Throttler> = Arc::new(TimeThrottler::from_settings(settings));
                options.throttler = Some(throttler.clone());
                throttler
            }
        };
        options.raise_on_warnings |= settings.raise_on_warnings;
        if options.pause_before_switch.is_none() {
            options.pause_before_switch = settings.pause_before_switch();
        }

        let mut db = db.with_overrides(&options.retry);
        let source = ChunkSource::load(&migration, &mut db, settings, throttler).await?;
        Ok(Self::new(migration, db, source, options))
    }

    pub fn migration(&self) -> &Migration {
        &self.migration
    }

    pub fn source(&self) -> &ChunkSource {
        &self.source
    }

    /// Check the source bounds. Empty tables are always valid.
    pub fn validate(&self) -> Result<()> {
        if self.source.table_empty() {
            return Ok(());
        }
        self.source.validate()
    }

    /// Copy every chunk.
    pub async fn execute(&mut self) -> Result<CopyStats> {
        match self.run().await {
            Ok(stats) => Ok(stats),
            Err(error) => {
                self.options.printer.exception(&error);
                Err(error)
            }
        }
    }

    async fn run(&mut self) -> Result<CopyStats> {
        let started = Instant::now();
        let mut stats = CopyStats::default();
        self.migration.validate()?;

        if self.source.table_empty() {
            debug!("[{}] {} is empty, nothing to copy", LOG_PREFIX, self.migration.origin_name());
            return Ok(stats);
        }

        let mut last_progress_log = started;
        while let Some(chunk) = self.source.next_chunk(&mut self.db).await? {
            self.verify_can_run().await?;

            let insert = ChunkInsert::new(&self.migration, &chunk);
            let expected_rows = insert.expected_rows();
            let affected_rows = insert.insert_and_return_count_of_rows_created(&mut self.db).await?;

            stats.chunks += 1;
            stats.rows_inserted += affected_rows;
            debug!(
                "[{}] {}..{}: {} of {} rows inserted",
                LOG_PREFIX,
                chunk.bottom(),
                chunk.top(),
                affected_rows,
                expected_rows
            );

            let now = Instant::now();
            if now.duration_since(last_progress_log) > PROGRESS_LOG_INTERVAL {
                info!(
                    "[{}] Inserted {} rows into the destination table so far, last chunk from {} to {}",
                    LOG_PREFIX,
                    stats.rows_inserted,
                    chunk.bottom(),
                    chunk.top()
                );
                last_progress_log = now;
            }

            if affected_rows < expected_rows {
                self.check_warnings().await?;
            }

            if affected_rows > 0 {
                if let Some(throttler) = &self.options.throttler {
                    throttler.run().await?;
                }
            }

            self.options
                .printer
                .notify(self.source.processed_rows(), self.source.max_rows());
        }

        self.options.printer.end();

        if let Some(pause) = self.options.pause_before_switch {
            info!("[{}] Pausing {:.1}s before switch", LOG_PREFIX, pause.as_secs_f64());
            tokio::time::sleep(pause).await;
        }

        stats.duration = started.elapsed();
        Ok(stats)
    }

    async fn verify_can_run(&mut self) -> Result<()> {
        let Some(verifier) = self.options.verifier.clone() else {
            return Ok(());
        };

        let overrides = self.options.retry.prefixed(LOG_PREFIX);
        self.db
            .with_retries(&overrides, |conn| {
                let verifier = verifier.clone();
                Box::pin(async move {
                    match verifier.verify(conn).await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(CopyError::VerificationFailed),
                        Err(e) => Err(e),
                    }
                })
            })
            .await
    }

    /// Fail (in strict mode) on any warning that is not a primary key duplicate.
    async fn check_warnings(&mut self) -> Result<()> {
        let warnings = self.db.show_warnings(QueryOptions::retried(LOG_PREFIX)).await?;
        for warning in warnings {
            if is_duplicate_primary_key(&warning.message) {
                continue;
            }

            warn!(
                "[{}] Unexpected warning found for inserted row: {}",
                LOG_PREFIX, warning.message
            );
            if self.options.raise_on_warnings {
                return Err(CopyError::UnexpectedWarning(warning.message));
            }
        }
        Ok(())
    }
}
