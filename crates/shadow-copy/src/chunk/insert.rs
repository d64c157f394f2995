//! Statement that copies one chunk.

use tracing::debug;

use super::{Chunk, ChunkBounds};
use crate::core::{Connection, Filter, Migration};
use crate::error::Result;
use crate::retry::{QueryOptions, SqlRetry};

const LOG_PREFIX: &str = "ChunkInsert";

/// Copies the rows of one chunk with `insert ignore ... select`.
///
/// Rows already present in the destination are skipped by the server, so
/// running the same chunk twice is harmless.
#[derive(Debug)]
pub struct ChunkInsert<'a> {
    migration: &'a Migration,
    chunk: &'a Chunk,
}

impl<'a> ChunkInsert<'a> {
    pub fn new(migration: &'a Migration, chunk: &'a Chunk) -> Self {
        Self { migration, chunk }
    }

    pub fn bottom(&self) -> i64 {
        self.chunk.bottom()
    }

    pub fn top(&self) -> i64 {
        self.chunk.top()
    }

    pub fn expected_rows(&self) -> u64 {
        self.chunk.expected_rows()
    }

    /// Render the statement. Dynamic filters are evaluated on every call.
    pub fn sql(&self) -> Result<String> {
        self.migration.validate()?;
        let origin = self.migration.origin_name();
        let filter = self.migration.filter()?;

        let id_condition = match self.chunk.bounds() {
            ChunkBounds::Range { bottom, top } => format!("between {} and {}", bottom, top),
            ChunkBounds::Ids(ids) => {
                let list: Vec<String> = ids.iter().map(i64::to_string).collect();
                format!("in ({})", list.join(","))
            }
        };

        Ok(format!(
            "insert ignore into {} ({}) select {} from {} {} {}.id {}",
            self.migration.destination_name(),
            self.migration.destination_columns().join(", "),
            self.migration.origin_columns().join(", "),
            origin,
            conditions_prefix(filter.as_ref()),
            origin,
            id_condition
        ))
    }

    /// Run the statement and return the number of rows it created.
    pub async fn insert_and_return_count_of_rows_created<C: Connection>(
        &self,
        db: &mut SqlRetry<C>,
    ) -> Result<u64> {
        let sql = self.sql()?;
        debug!("[{}] {}", LOG_PREFIX, sql);
        db.update(&sql, QueryOptions::retried(LOG_PREFIX)).await
    }
}

/// Clause placed between the origin table and the id condition.
fn conditions_prefix(filter: Option<&Filter>) -> String {
    match filter {
        Some(Filter::Where(predicate)) => format!("where ({}) and", predicate),
        Some(Filter::Join(join)) => format!("{} where", join),
        None => "where".to_string(),
    }
}
