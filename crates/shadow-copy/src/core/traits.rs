//! Capability traits for the collaborators the copy engine talks to.
//!
//! - [`Connection`]: the database session chunks are discovered and copied on
//! - [`Throttler`]: supplies the stride and paces the copy between chunks
//! - [`Printer`]: receives progress updates
//! - [`Verifier`]: decides, before each chunk, whether the copy may continue
//!
//! The engine owns none of the policy behind these; it only drives them.

use async_trait::async_trait;

use crate::error::{CopyError, Result};

/// A row returned by `SHOW WARNINGS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlWarning {
    /// `Note`, `Warning` or `Error`.
    pub level: String,
    /// MySQL error code.
    pub code: u32,
    /// Human readable message.
    pub message: String,
}

impl SqlWarning {
    pub fn new(level: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            code,
            message: message.into(),
        }
    }
}

/// A single database session.
///
/// Implementations report every failure as a [`CopyError`] whose message is
/// the server's own text, because retry eligibility is decided by matching on
/// that text.
#[async_trait]
pub trait Connection: Send {
    /// Run a query and return the first column of the first row.
    ///
    /// `None` when there are no rows or the value is NULL.
    async fn select_value(&mut self, sql: &str) -> Result<Option<i64>>;

    /// Run a query and return the first column of every row, in order.
    async fn select_values(&mut self, sql: &str) -> Result<Vec<i64>>;

    /// Run a data-modifying statement and return the number of affected rows.
    async fn update(&mut self, sql: &str) -> Result<u64>;

    /// Return the warnings left by the last statement on this session.
    async fn show_warnings(&mut self) -> Result<Vec<SqlWarning>>;

    /// Identity (`host:port`) of the server this session is talking to.
    async fn server_identity(&mut self) -> Result<Option<String>>;
}

/// Paces the copy and decides how many rows go in each chunk.
#[async_trait]
pub trait Throttler: Send + Sync {
    /// Target number of rows per chunk. Read again for every chunk.
    fn stride(&self) -> u64;

    /// Wait before the next chunk.
    async fn run(&self) -> Result<()>;
}

/// Progress sink.
pub trait Printer: Send {
    fn notify(&mut self, processed: u64, total: u64);

    fn end(&mut self);

    /// Called with any error that aborts the copy.
    fn exception(&mut self, _error: &CopyError) {}
}

/// Per-chunk go/no-go check (replication lag, maintenance windows, ...).
#[async_trait]
pub trait Verifier<C: Connection>: Send + Sync {
    /// Return `false` to abort the copy before the next chunk.
    async fn verify(&self, connection: &mut C) -> Result<bool>;
}
