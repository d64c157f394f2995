//! Chunk discovery and chunk statements.
//!
//! A [`ChunkSource`] walks the origin table and hands out [`Chunk`]s one at a
//! time; [`ChunkInsert`] turns a chunk into the `insert ignore ... select`
//! statement that copies it. Two strategies exist:
//!
//! - **Range** ([`RangeChunkSource`]): walks the primary key with
//!   `order by id limit 1 offset stride-1` lookups, producing inclusive
//!   `[bottom, top]` ranges that hold at most `stride` rows even when the id
//!   space has gaps.
//! - **Id set** ([`IdSetChunkSource`]): snapshots every primary key up front
//!   and copies it in slices of `stride` ids.
//!
//! Both read the stride from the throttler for every chunk, so a stride
//! change only affects chunks that have not been handed out yet. Sources are
//! single pass: once exhausted they keep returning `None`.

mod id_set;
mod insert;
mod range;

pub use id_set::{IdSetChunkSource, IdSetOptions};
pub use insert::ChunkInsert;
pub use range::{RangeChunkSource, RangeOptions};

use std::sync::Arc;

use crate::config::{ChunkStrategy, CopySettings};
use crate::core::{Connection, Migration, Throttler};
use crate::error::Result;
use crate::retry::SqlRetry;

/// Log prefix for boundary discovery queries.
pub const LOG_PREFIX: &str = "Chunker";

/// Which rows a chunk covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkBounds {
    /// Inclusive primary key range.
    Range { bottom: i64, top: i64 },
    /// Explicit, ascending, non-empty primary key list.
    Ids(Vec<i64>),
}

/// One unit of copy work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    bounds: ChunkBounds,
    expected_rows: u64,
}

impl Chunk {
    /// Chunk covering `bottom..=top`, expecting every id in between to exist.
    pub fn range(bottom: i64, top: i64) -> Self {
        let width = (top as i128 - bottom as i128 + 1).max(0);
        Self {
            bounds: ChunkBounds::Range { bottom, top },
            expected_rows: u64::try_from(width).unwrap_or(u64::MAX),
        }
    }

    /// Chunk covering exactly `ids`. Returns `None` for an empty list.
    pub fn ids(ids: Vec<i64>) -> Option<Self> {
        if ids.is_empty() {
            return None;
        }
        let expected_rows = ids.len() as u64;
        Some(Self {
            bounds: ChunkBounds::Ids(ids),
            expected_rows,
        })
    }

    /// Override the number of rows the insert is expected to create.
    pub fn with_expected_rows(mut self, expected_rows: u64) -> Self {
        self.expected_rows = expected_rows;
        self
    }

    pub fn bounds(&self) -> &ChunkBounds {
        &self.bounds
    }

    pub fn expected_rows(&self) -> u64 {
        self.expected_rows
    }

    /// Lowest id covered.
    pub fn bottom(&self) -> i64 {
        match &self.bounds {
            ChunkBounds::Range { bottom, .. } => *bottom,
            // non-empty by construction
            ChunkBounds::Ids(ids) => ids[0],
        }
    }

    /// Highest id covered.
    pub fn top(&self) -> i64 {
        match &self.bounds {
            ChunkBounds::Range { top, .. } => *top,
            ChunkBounds::Ids(ids) => ids[ids.len() - 1],
        }
    }
}

/// The chunking strategy in use for a copy run.
#[derive(Debug)]
pub enum ChunkSource {
    Range(RangeChunkSource),
    IdSet(IdSetChunkSource),
}

impl ChunkSource {
    /// Build the source selected by `settings.strategy`.
    pub async fn load<C: Connection>(
        migration: &Migration,
        db: &mut SqlRetry<C>,
        settings: &CopySettings,
        throttler: Arc<dyn Throttler>,
    ) -> Result<Self> {
        match settings.strategy {
            ChunkStrategy::Range => {
                let options = RangeOptions {
                    start: settings.start,
                    limit: settings.limit,
                    throttler,
                };
                Ok(ChunkSource::Range(
                    RangeChunkSource::load(migration, db, options).await?,
                ))
            }
            ChunkStrategy::IdSet => {
                let options = IdSetOptions {
                    ids: None,
                    throttler,
                };
                Ok(ChunkSource::IdSet(
                    IdSetChunkSource::load(migration, db, options).await?,
                ))
            }
        }
    }

    /// True when there is nothing to copy.
    pub fn table_empty(&self) -> bool {
        match self {
            ChunkSource::Range(source) => source.table_empty(),
            ChunkSource::IdSet(source) => source.table_empty(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ChunkSource::Range(source) => source.validate(),
            ChunkSource::IdSet(source) => source.validate(),
        }
    }

    /// Rows the whole run is expected to cover.
    pub fn max_rows(&self) -> u64 {
        match self {
            ChunkSource::Range(source) => source.max_rows(),
            ChunkSource::IdSet(source) => source.max_rows(),
        }
    }

    /// Rows covered by the chunks handed out so far.
    pub fn processed_rows(&self) -> u64 {
        match self {
            ChunkSource::Range(source) => source.processed_rows(),
            ChunkSource::IdSet(source) => source.processed_rows(),
        }
    }

    /// Next chunk, or `None` once the source is exhausted.
    pub async fn next_chunk<C: Connection>(&mut self, db: &mut SqlRetry<C>) -> Result<Option<Chunk>> {
        match self {
            ChunkSource::Range(source) => source.next_chunk(db).await,
            ChunkSource::IdSet(source) => Ok(source.next_chunk()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::test_utils::FakeConnection;
    use crate::throttler::TimeThrottler;
    use std::time::Duration;

    #[test]
    fn test_range_chunk_expected_rows() {
        let chunk = Chunk::range(5, 9);
        assert_eq!(chunk.expected_rows(), 5);
        assert_eq!(chunk.bottom(), 5);
        assert_eq!(chunk.top(), 9);
        assert_eq!(Chunk::range(3, 3).expected_rows(), 1);
    }

    #[test]
    fn test_range_chunk_expected_rows_does_not_overflow() {
        let chunk = Chunk::range(i64::MIN, i64::MAX);
        assert_eq!(chunk.expected_rows(), u64::MAX);
    }

    #[test]
    fn test_id_chunk() {
        let chunk = Chunk::ids(vec![4, 8, 15]).unwrap();
        assert_eq!(chunk.expected_rows(), 3);
        assert_eq!(chunk.bottom(), 4);
        assert_eq!(chunk.top(), 15);
        assert!(Chunk::ids(Vec::new()).is_none());
    }

    #[test]
    fn test_expected_rows_override() {
        let chunk = Chunk::range(1, 100).with_expected_rows(7);
        assert_eq!(chunk.expected_rows(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_selects_strategy() {
        let fake = FakeConnection::new().with_origin_ids([1, 2, 3]);
        let migration = Migration::new("foo", "bar").unwrap();
        let mut db = SqlRetry::new(fake.clone(), RetryPolicy::default()).await.unwrap();
        let throttler: Arc<dyn Throttler> = Arc::new(TimeThrottler::new(2, Duration::ZERO));

        let settings = CopySettings::default();
        let source = ChunkSource::load(&migration, &mut db, &settings, throttler.clone())
            .await
            .unwrap();
        assert!(matches!(source, ChunkSource::Range(_)));
        assert_eq!(source.max_rows(), 3);

        let settings = CopySettings {
            strategy: ChunkStrategy::IdSet,
            ..Default::default()
        };
        let source = ChunkSource::load(&migration, &mut db, &settings, throttler)
            .await
            .unwrap();
        assert!(matches!(source, ChunkSource::IdSet(_)));
        assert_eq!(source.max_rows(), 3);
        assert_eq!(fake.statements_matching("order by id asc"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_honours_configured_bounds() {
        let fake = FakeConnection::new().with_origin_ids(1..=100);
        let migration = Migration::new("foo", "bar").unwrap();
        let mut db = SqlRetry::new(fake.clone(), RetryPolicy::default()).await.unwrap();
        let settings = CopySettings {
            start: Some(10),
            limit: Some(19),
            ..Default::default()
        };

        let source = ChunkSource::load(
            &migration,
            &mut db,
            &settings,
            Arc::new(TimeThrottler::default()),
        )
        .await
        .unwrap();

        assert_eq!(source.max_rows(), 10);
        assert_eq!(fake.statements_matching("min(id)"), 0);
        assert_eq!(fake.statements_matching("max(id)"), 0);
    }
}
