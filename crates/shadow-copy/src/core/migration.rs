//! Migration descriptor: which table is copied where, and how rows are filtered.

use std::fmt;
use std::sync::Arc;

use super::identifier::{validate_fragment, validate_identifier};
use crate::error::{CopyError, Result};

/// A single row filter applied to every chunk statement.
///
/// A filter is either one WHERE predicate or one JOIN fragment, never both.
/// Combining a join with a predicate (or adding GROUP BY and friends) is not
/// supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Predicate without the leading `where` keyword, e.g. `foo.created_at > '2013-07-10'`.
    Where(String),
    /// Complete join fragment, e.g. `inner join bar on foo.id = bar.foo_id`.
    Join(String),
}

impl Filter {
    /// Parse the string form used by migration definitions.
    ///
    /// A fragment starting with `where` becomes [`Filter::Where`]; the keyword
    /// and an unbalanced trailing `)` are stripped. Anything else is treated as
    /// a join fragment.
    pub fn parse(fragment: &str) -> Result<Self> {
        let trimmed = fragment.trim();
        let filter = match strip_where_keyword(trimmed) {
            Some(predicate) => Filter::Where(strip_unbalanced_paren(predicate).trim().to_string()),
            None => Filter::Join(trimmed.to_string()),
        };
        filter.validate()?;
        Ok(filter)
    }

    /// Reject empty fragments and fragments carrying statement terminators or comments.
    pub fn validate(&self) -> Result<()> {
        match self {
            Filter::Where(predicate) => validate_fragment(predicate),
            Filter::Join(fragment) => {
                validate_fragment(fragment)?;
                if strip_where_keyword(fragment.trim()).is_some() {
                    return Err(CopyError::Config(format!(
                        "Join filter cannot start with a WHERE clause: {:?}",
                        fragment
                    )));
                }
                Ok(())
            }
        }
    }
}

fn strip_where_keyword(fragment: &str) -> Option<&str> {
    let head = fragment.get(..5)?;
    let rest = &fragment[5..];
    if head.eq_ignore_ascii_case("where") && (rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        Some(rest)
    } else {
        None
    }
}

fn strip_unbalanced_paren(predicate: &str) -> &str {
    let trimmed = predicate.trim_end();
    let opens = trimmed.matches('(').count();
    let closes = trimmed.matches(')').count();
    if closes > opens {
        trimmed.strip_suffix(')').unwrap_or(trimmed)
    } else {
        trimmed
    }
}

type FilterFn = dyn Fn() -> Filter + Send + Sync;

/// Filter source for a migration.
#[derive(Clone)]
pub enum Conditions {
    /// Same filter for every chunk.
    Fixed(Filter),
    /// Re-evaluated each time a chunk statement is built.
    Dynamic(Arc<FilterFn>),
}

impl fmt::Debug for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conditions::Fixed(filter) => f.debug_tuple("Fixed").field(filter).finish(),
            Conditions::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

/// Origin/destination pair with aligned column projections.
#[derive(Debug, Clone)]
pub struct Migration {
    origin_name: String,
    destination_name: String,
    origin_columns: Vec<String>,
    destination_columns: Vec<String>,
    conditions: Option<Conditions>,
}

impl Migration {
    /// Create a migration between two tables with no filter.
    ///
    /// Column projections must be set with [`Migration::with_columns`] before
    /// the migration is copied.
    pub fn new(origin_name: impl Into<String>, destination_name: impl Into<String>) -> Result<Self> {
        let origin_name = origin_name.into();
        let destination_name = destination_name.into();
        validate_identifier(&origin_name)?;
        validate_identifier(&destination_name)?;

        Ok(Self {
            origin_name,
            destination_name,
            origin_columns: Vec::new(),
            destination_columns: Vec::new(),
            conditions: None,
        })
    }

    /// Set the column projections. Both lists must line up position by position.
    pub fn with_columns<O, D>(mut self, origin_columns: O, destination_columns: D) -> Result<Self>
    where
        O: IntoIterator,
        O::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let origin_columns: Vec<String> = origin_columns.into_iter().map(Into::into).collect();
        let destination_columns: Vec<String> =
            destination_columns.into_iter().map(Into::into).collect();

        if origin_columns.is_empty() {
            return Err(CopyError::Config(
                "column projections cannot be empty".to_string(),
            ));
        }
        for column in origin_columns.iter().chain(&destination_columns) {
            validate_identifier(column)?;
        }

        if origin_columns.len() != destination_columns.len() {
            return Err(CopyError::Config(format!(
                "column projections must have the same length (origin: {}, destination: {})",
                origin_columns.len(),
                destination_columns.len()
            )));
        }

        self.origin_columns = origin_columns;
        self.destination_columns = destination_columns;
        Ok(self)
    }

    /// Use a fixed filter for every chunk.
    pub fn with_filter(mut self, filter: Filter) -> Result<Self> {
        filter.validate()?;
        self.conditions = Some(Conditions::Fixed(filter));
        Ok(self)
    }

    /// Use a filter that is rebuilt for every chunk statement.
    pub fn with_dynamic_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn() -> Filter + Send + Sync + 'static,
    {
        self.conditions = Some(Conditions::Dynamic(Arc::new(filter)));
        self
    }

    pub fn origin_name(&self) -> &str {
        &self.origin_name
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }

    pub fn origin_columns(&self) -> &[String] {
        &self.origin_columns
    }

    pub fn destination_columns(&self) -> &[String] {
        &self.destination_columns
    }

    pub fn conditions(&self) -> Option<&Conditions> {
        self.conditions.as_ref()
    }

    /// Check the migration can produce a chunk statement.
    pub fn validate(&self) -> Result<()> {
        if self.origin_columns.is_empty() {
            return Err(CopyError::Config(format!(
                "migration {} -> {} has no columns to copy",
                self.origin_name, self.destination_name
            )));
        }
        Ok(())
    }

    /// Evaluate the current filter.
    pub fn filter(&self) -> Result<Option<Filter>> {
        match &self.conditions {
            None => Ok(None),
            Some(Conditions::Fixed(filter)) => Ok(Some(filter.clone())),
            Some(Conditions::Dynamic(build)) => {
                let filter = build();
                filter.validate()?;
                Ok(Some(filter))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_where_clause() {
        let filter = Filter::parse("where foo.created_at > '2013-07-10'").unwrap();
        assert_eq!(filter, Filter::Where("foo.created_at > '2013-07-10'".into()));
    }

    #[test]
    fn test_parse_where_is_case_insensitive() {
        let filter = Filter::parse("  WHERE foo.baz = 'quux'  ").unwrap();
        assert_eq!(filter, Filter::Where("foo.baz = 'quux'".into()));
    }

    #[test]
    fn test_parse_strips_unbalanced_trailing_paren() {
        let filter = Filter::parse("where foo.a = 1)").unwrap();
        assert_eq!(filter, Filter::Where("foo.a = 1".into()));

        let balanced = Filter::parse("where (foo.a = 1) or (foo.b = 2)").unwrap();
        assert_eq!(balanced, Filter::Where("(foo.a = 1) or (foo.b = 2)".into()));
    }

    #[test]
    fn test_parse_join() {
        let filter = Filter::parse("inner join bar on foo.id = bar.foo_id").unwrap();
        assert_eq!(filter, Filter::Join("inner join bar on foo.id = bar.foo_id".into()));
    }

    #[test]
    fn test_word_starting_with_where_is_not_a_where_clause() {
        let filter = Filter::parse("whereabouts join x on 1 = 1").unwrap();
        assert!(matches!(filter, Filter::Join(_)));
    }

    #[test]
    fn test_parse_rejects_injection() {
        assert!(Filter::parse("where 1 = 1; drop table foo").is_err());
        assert!(Filter::parse("where").is_err());
    }

    #[test]
    fn test_join_cannot_smuggle_where() {
        assert!(Filter::Join("where foo.a = 1".into()).validate().is_err());
    }

    #[test]
    fn test_migration_rejects_bad_table_names() {
        assert!(Migration::new("foo", "bar").is_ok());
        assert!(Migration::new("foo bar", "bar").is_err());
        assert!(Migration::new("foo", "").is_err());
    }

    #[test]
    fn test_columns_must_align() {
        let migration = Migration::new("foo", "bar").unwrap();
        assert!(migration
            .clone()
            .with_columns(["id", "name"], ["id", "name"])
            .is_ok());
        assert!(migration.clone().with_columns(["id", "name"], ["id"]).is_err());
        assert!(migration
            .clone()
            .with_columns(Vec::<String>::new(), Vec::<String>::new())
            .is_err());
        assert!(migration.with_columns(["id", "full name"], ["id", "name"]).is_err());
    }

    #[test]
    fn test_migration_without_columns_is_invalid() {
        let migration = Migration::new("foo", "bar").unwrap();
        let err = migration.validate().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: migration foo -> bar has no columns to copy");

        let migration = migration.with_columns(["id"], ["id"]).unwrap();
        assert!(migration.validate().is_ok());
    }

    #[test]
    fn test_dynamic_filter_is_evaluated_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let migration = Migration::new("foo", "bar")
            .unwrap()
            .with_dynamic_filter(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Filter::Where(format!("foo.n > {}", n))
            });

        assert_eq!(
            migration.filter().unwrap(),
            Some(Filter::Where("foo.n > 0".into()))
        );
        assert_eq!(
            migration.filter().unwrap(),
            Some(Filter::Where("foo.n > 1".into()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dynamic_filter_is_validated() {
        let migration = Migration::new("foo", "bar")
            .unwrap()
            .with_dynamic_filter(|| Filter::Where("1=1; drop table foo".into()));
        assert!(migration.filter().is_err());
    }
}
