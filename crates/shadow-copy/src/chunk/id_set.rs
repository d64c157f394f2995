//! Snapshot-of-ids chunking.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{Chunk, LOG_PREFIX};
use crate::core::{Connection, Migration, Throttler};
use crate::error::Result;
use crate::retry::{QueryOptions, SqlRetry};

/// Options for [`IdSetChunkSource::load`].
pub struct IdSetOptions {
    /// Ids to copy. When absent every origin id is read up front.
    pub ids: Option<Vec<i64>>,
    pub throttler: Arc<dyn Throttler>,
}

/// Copies a fixed, ascending list of ids in slices of `stride`.
///
/// Rows inserted into the origin after the snapshot are not copied by this
/// source.
pub struct IdSetChunkSource {
    ids: Vec<i64>,
    throttler: Arc<dyn Throttler>,
    processed: usize,
}

impl fmt::Debug for IdSetChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdSetChunkSource")
            .field("ids", &self.ids.len())
            .field("processed", &self.processed)
            .finish_non_exhaustive()
    }
}

impl IdSetChunkSource {
    pub async fn load<C: Connection>(
        migration: &Migration,
        db: &mut SqlRetry<C>,
        options: IdSetOptions,
    ) -> Result<Self> {
        let ids = match options.ids {
            Some(mut ids) => {
                ids.sort_unstable();
                ids.dedup();
                ids
            }
            None => {
                let sql = format!("select id from {} order by id asc", migration.origin_name());
                db.select_values(&sql, QueryOptions::retried(LOG_PREFIX)).await?
            }
        };

        debug!(
            "[{}] id set source for {}: {} ids",
            LOG_PREFIX,
            migration.origin_name(),
            ids.len()
        );

        Ok(Self {
            ids,
            throttler: options.throttler,
            processed: 0,
        })
    }

    /// The ids this source copies, in order.
    pub fn snapshot(&self) -> &[i64] {
        &self.ids
    }

    pub fn table_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        Ok(())
    }

    pub fn max_rows(&self) -> u64 {
        self.ids.len() as u64
    }

    pub fn processed_rows(&self) -> u64 {
        self.processed as u64
    }

    pub fn next_chunk(&mut self) -> Option<Chunk> {
        let stride = usize::try_from(self.throttler.stride().max(1)).unwrap_or(usize::MAX);
        let end = self.processed.saturating_add(stride).min(self.ids.len());
        let chunk = Chunk::ids(self.ids[self.processed..end].to_vec())?;
        self.processed = end;
        Some(chunk)
    }
}
