//! Primary-key range chunking.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{Chunk, LOG_PREFIX};
use crate::core::{Connection, Migration, Throttler};
use crate::error::{CopyError, Result};
use crate::retry::{QueryOptions, SqlRetry};

/// Options for [`RangeChunkSource::load`].
pub struct RangeOptions {
    /// First id to copy; defaults to `min(id)` of the origin.
    pub start: Option<i64>,
    /// Last id to copy; defaults to `max(id)` of the origin.
    pub limit: Option<i64>,
    pub throttler: Arc<dyn Throttler>,
}

/// Walks `[start, limit]` in ranges of at most `stride` existing rows.
pub struct RangeChunkSource {
    origin_name: String,
    start: Option<i64>,
    limit: Option<i64>,
    throttler: Arc<dyn Throttler>,
    next_id: Option<i64>,
    processed_rows: u64,
}

impl fmt::Debug for RangeChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeChunkSource")
            .field("origin_name", &self.origin_name)
            .field("start", &self.start)
            .field("limit", &self.limit)
            .field("next_id", &self.next_id)
            .field("processed_rows", &self.processed_rows)
            .finish_non_exhaustive()
    }
}

impl RangeChunkSource {
    /// Resolve the id bounds, querying the origin for any that were not given.
    pub async fn load<C: Connection>(
        migration: &Migration,
        db: &mut SqlRetry<C>,
        options: RangeOptions,
    ) -> Result<Self> {
        let origin_name = migration.origin_name().to_string();

        let start = match options.start {
            Some(start) => Some(start),
            None => {
                let sql = format!("select min(id) from {}", origin_name);
                db.select_value(&sql, QueryOptions::retried(LOG_PREFIX)).await?
            }
        };
        let limit = match options.limit {
            Some(limit) => Some(limit),
            None => {
                let sql = format!("select max(id) from {}", origin_name);
                db.select_value(&sql, QueryOptions::retried(LOG_PREFIX)).await?
            }
        };

        debug!(
            "[{}] range source for {}: start={:?} limit={:?}",
            LOG_PREFIX, origin_name, start, limit
        );

        Ok(Self {
            origin_name,
            start,
            limit,
            throttler: options.throttler,
            next_id: start,
            processed_rows: 0,
        })
    }

    pub fn start(&self) -> Option<i64> {
        self.start
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn table_empty(&self) -> bool {
        self.start.is_none() && self.limit.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(limit)) = (self.start, self.limit) {
            if start > limit {
                return Err(CopyError::Bounds { start, limit });
            }
        }
        Ok(())
    }

    /// `limit - start + 1`, or 0 when either bound is unknown or inverted.
    pub fn max_rows(&self) -> u64 {
        match (self.start, self.limit) {
            (Some(start), Some(limit)) if limit >= start => {
                u64::try_from(limit as i128 - start as i128 + 1).unwrap_or(u64::MAX)
            }
            _ => 0,
        }
    }

    pub fn processed_rows(&self) -> u64 {
        self.processed_rows
    }

    pub async fn next_chunk<C: Connection>(&mut self, db: &mut SqlRetry<C>) -> Result<Option<Chunk>> {
        let (Some(bottom), Some(limit)) = (self.next_id, self.limit) else {
            return Ok(None);
        };
        if bottom > limit {
            self.next_id = None;
            return Ok(None);
        }

        let stride = self.throttler.stride().max(1);
        let top = self.top(db, bottom, stride, limit).await?;

        let max_rows = self.max_rows();
        self.processed_rows = self.processed_rows.saturating_add(stride).min(max_rows);
        if top >= limit {
            self.processed_rows = max_rows;
            self.next_id = None;
        } else {
            self.next_id = Some(top + 1);
        }

        Ok(Some(Chunk::range(bottom, top)))
    }

    /// Id of the `stride`-th existing row at or after `bottom`, capped at `limit`.
    async fn top<C: Connection>(
        &self,
        db: &mut SqlRetry<C>,
        bottom: i64,
        stride: u64,
        limit: i64,
    ) -> Result<i64> {
        let sql = format!(
            "select id from {} where id >= {} order by id limit 1 offset {}",
            self.origin_name,
            bottom,
            stride - 1
        );
        let found = db.select_value(&sql, QueryOptions::retried(LOG_PREFIX)).await?;
        Ok(found.unwrap_or(limit).min(limit))
    }
}
