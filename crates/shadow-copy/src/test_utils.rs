//! In-memory stand-in for a MySQL session.
//!
//! [`FakeConnection`] understands exactly the statements the engine issues
//! (min/max lookups, offset lookups, id listing, `insert ignore ... select`,
//! `show warnings`, the identity query) and runs them against two id sets.
//! Handles are cheap clones sharing one state, so a test can keep one while
//! the engine owns another.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use regex::Regex;

use crate::core::{Connection, SqlWarning};
use crate::error::{CopyError, Result};

pub(crate) const IDENTITY_SQL: &str = "SELECT @@hostname, @@port";

#[derive(Debug, Default)]
struct FakeState {
    origin: BTreeSet<i64>,
    destination: BTreeSet<i64>,
    statements: Vec<String>,
    failures: VecDeque<(String, String)>,
    extra_warnings: VecDeque<SqlWarning>,
    last_warnings: Vec<SqlWarning>,
    host: String,
    queued_hosts: VecDeque<String>,
    deletes_after_insert: Vec<i64>,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnection {
    pub fn new() -> Self {
        let state = FakeState {
            host: "localhost:3306".to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_origin_ids(self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.state().origin.extend(ids);
        self
    }

    pub fn with_destination_ids(self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.state().destination.extend(ids);
        self
    }

    pub fn with_host(self, host: &str) -> Self {
        self.state().host = host.to_string();
        self
    }

    pub fn set_host(&self, host: &str) {
        self.state().host = host.to_string();
    }

    /// Identities returned by the next identity queries, before falling back to the host.
    pub fn queue_hosts<'a>(&self, hosts: impl IntoIterator<Item = &'a str>) {
        self.state()
            .queued_hosts
            .extend(hosts.into_iter().map(str::to_string));
    }

    /// Fail the next statement containing `fragment` with `message`.
    pub fn fail_next(&self, fragment: &str, message: &str) {
        self.state()
            .failures
            .push_back((fragment.to_string(), message.to_string()));
    }

    /// Report `warning` (besides duplicate-key ones) after the next insert.
    pub fn warn_on_next_insert(&self, warning: SqlWarning) {
        self.state().extra_warnings.push_back(warning);
    }

    /// Delete `id` from the origin right after the first insert runs.
    pub fn delete_after_first_insert(&self, id: i64) {
        self.state().deletes_after_insert.push(id);
    }

    pub fn remove_origin_id(&self, id: i64) {
        self.state().origin.remove(&id);
    }

    pub fn insert_origin_id(&self, id: i64) {
        self.state().origin.insert(id);
    }

    pub fn destination_ids(&self) -> Vec<i64> {
        self.state().destination.iter().copied().collect()
    }

    pub fn origin_ids(&self) -> Vec<i64> {
        self.state().origin.iter().copied().collect()
    }

    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn statements_matching(&self, fragment: &str) -> usize {
        self.state()
            .statements
            .iter()
            .filter(|s| s.contains(fragment))
            .count()
    }

    pub fn inserts(&self) -> Vec<String> {
        self.state()
            .statements
            .iter()
            .filter(|s| s.starts_with("insert ignore"))
            .cloned()
            .collect()
    }

    fn record(&self, sql: &str) -> Result<()> {
        let mut state = self.state();
        state.statements.push(sql.to_string());
        let failure = state
            .failures
            .iter()
            .position(|(fragment, _)| sql.contains(fragment.as_str()));
        if let Some(index) = failure {
            if let Some((_, message)) = state.failures.remove(index) {
                return Err(CopyError::sql(message));
            }
        }
        Ok(())
    }
}

fn capture_i64(re: &str, sql: &str, group: usize) -> Option<i64> {
    Regex::new(re)
        .unwrap()
        .captures(sql)
        .and_then(|c| c.get(group))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl Connection for FakeConnection {
    async fn select_value(&mut self, sql: &str) -> Result<Option<i64>> {
        self.record(sql)?;
        let state = self.state();

        if sql.contains("min(id)") {
            return Ok(state.origin.first().copied());
        }
        if sql.contains("max(id)") {
            return Ok(state.origin.last().copied());
        }
        if sql.contains("order by id limit 1 offset") {
            let from = capture_i64(r"id >= (-?\d+)", sql, 1).unwrap();
            let offset = capture_i64(r"offset (\d+)", sql, 1).unwrap();
            return Ok(state.origin.range(from..).nth(offset as usize).copied());
        }

        Err(CopyError::sql(format!("unsupported query: {}", sql)))
    }

    async fn select_values(&mut self, sql: &str) -> Result<Vec<i64>> {
        self.record(sql)?;
        if sql.contains("order by id asc") {
            return Ok(self.origin_ids());
        }
        Err(CopyError::sql(format!("unsupported query: {}", sql)))
    }

    async fn update(&mut self, sql: &str) -> Result<u64> {
        self.record(sql)?;
        if !sql.starts_with("insert ignore into") {
            return Err(CopyError::sql(format!("unsupported statement: {}", sql)));
        }

        let mut state = self.state();
        let candidates: Vec<i64> = if let Some(bottom) = capture_i64(r"\.id between (-?\d+) and", sql, 1) {
            let top = capture_i64(r"\.id between -?\d+ and (-?\d+)", sql, 1).unwrap();
            state.origin.range(bottom..=top).copied().collect()
        } else {
            let list = Regex::new(r"\.id in \(([^)]*)\)")
                .unwrap()
                .captures(sql)
                .map(|c| c[1].to_string())
                .unwrap();
            list.split(',')
                .map(|id| id.trim().parse::<i64>().unwrap())
                .filter(|id| state.origin.contains(id))
                .collect()
        };

        let mut inserted = 0;
        let mut warnings = Vec::new();
        for id in candidates {
            if state.destination.insert(id) {
                inserted += 1;
            } else {
                warnings.push(SqlWarning::new(
                    "Warning",
                    1062,
                    format!("Duplicate entry '{}' for key 'PRIMARY'", id),
                ));
            }
        }
        warnings.extend(state.extra_warnings.drain(..));
        state.last_warnings = warnings;

        for id in std::mem::take(&mut state.deletes_after_insert) {
            state.origin.remove(&id);
        }

        Ok(inserted)
    }

    async fn show_warnings(&mut self) -> Result<Vec<SqlWarning>> {
        self.record("show warnings")?;
        Ok(self.state().last_warnings.clone())
    }

    async fn server_identity(&mut self) -> Result<Option<String>> {
        self.record(IDENTITY_SQL)?;
        let mut state = self.state();
        let host = match state.queued_hosts.pop_front() {
            Some(host) => host,
            None => state.host.clone(),
        };
        Ok(Some(host))
    }
}
