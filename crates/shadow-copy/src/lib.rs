//! # shadow-copy
//!
//! Chunked row copy engine for online MySQL schema changes.
//!
//! Rows are copied from a live origin table into a schema-altered destination
//! table with `insert ignore ... select`, one bounded window of primary keys
//! at a time, without locking the origin:
//!
//! - **Chunking** by primary key range or by a snapshot of ids
//! - **Retries** of transient SQL errors with backoff and a server identity guard
//! - **Warning inspection** separating duplicate-key races from real anomalies
//! - **Pacing** through a pluggable throttler and progress printer
//!
//! Re-running a copy, or any chunk of it, never duplicates rows.
//!
//! ## Example
//!
//! ```rust,no_run
//! use shadow_copy::{
//!     Chunker, ChunkerOptions, CopyConfig, CopyError, Migration, MysqlConnection, RetryPolicy,
//!     SqlRetry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> shadow_copy::Result<()> {
//!     let config = CopyConfig::load("shadow-copy.yaml")?;
//!     let database = config
//!         .database
//!         .as_ref()
//!         .ok_or_else(|| CopyError::Config("database section is required".into()))?;
//!
//!     let connection = MysqlConnection::connect(database).await?;
//!     let db = SqlRetry::new(connection, RetryPolicy::from_config(&config.retry)?).await?;
//!     let migration = Migration::new("users", "users_new")?
//!         .with_columns(["id", "email"], ["id", "email"])?;
//!
//!     let mut chunker = Chunker::load(migration, db, &config, ChunkerOptions::default()).await?;
//!     chunker.validate()?;
//!     let stats = chunker.execute().await?;
//!     println!("Copied {} rows in {} chunks", stats.rows_inserted, stats.chunks);
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod chunker;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod printer;
pub mod retry;
pub mod throttler;

#[cfg(test)]
mod test_utils;

// Re-exports for convenient access
pub use chunk::{Chunk, ChunkBounds, ChunkInsert, ChunkSource, IdSetChunkSource, RangeChunkSource};
pub use chunker::{Chunker, ChunkerOptions, CopyStats};
pub use config::{ChunkStrategy, CopyConfig, CopySettings, DatabaseConfig, RetryConfig};
pub use self::core::{Conditions, Connection, Filter, Migration, Printer, SqlWarning, Throttler, Verifier};
pub use drivers::MysqlConnection;
pub use error::{CopyError, ErrorKind, Result};
pub use printer::{NullPrinter, PercentagePrinter};
pub use retry::{QueryOptions, RetryOverrides, RetryPolicy, SqlRetry};
pub use throttler::TimeThrottler;
