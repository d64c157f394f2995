//! Identifier and filter-fragment validation.
//!
//! Copy statements render table and column names unquoted (`insert ignore
//! into bar ... from foo where foo.id between ...`), so identifiers are
//! restricted to bare MySQL words that are not reserved, instead of being
//! escaped. Filter fragments are free-form SQL supplied by the caller; they
//! are scanned for statement terminators and comment markers outside of
//! string literals and quoted identifiers before they are spliced into a
//! statement.

use crate::error::{CopyError, Result};

/// Maximum identifier length (MySQL limit).
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// MySQL 8.0 reserved words. They only parse as identifiers when quoted.
const RESERVED_WORDS: &[&str] = &[
    "accessible", "add", "all", "alter", "analyze", "and", "as", "asc", "asensitive",
    "before", "between", "bigint", "binary", "blob", "both", "by", "call", "cascade",
    "case", "change", "char", "character", "check", "collate", "column", "condition",
    "constraint", "continue", "convert", "create", "cross", "cube", "cume_dist",
    "current_date", "current_time", "current_timestamp", "current_user", "cursor",
    "database", "databases", "day_hour", "day_microsecond", "day_minute", "day_second",
    "dec", "decimal", "declare", "default", "delayed", "delete", "dense_rank", "desc",
    "describe", "deterministic", "distinct", "distinctrow", "div", "double", "drop",
    "dual", "each", "else", "elseif", "empty", "enclosed", "escaped", "except",
    "exists", "exit", "explain", "false", "fetch", "first_value", "float", "float4",
    "float8", "for", "force", "foreign", "from", "fulltext", "function", "generated",
    "get", "grant", "group", "grouping", "groups", "having", "high_priority",
    "hour_microsecond", "hour_minute", "hour_second", "if", "ignore", "in", "index",
    "infile", "inner", "inout", "insensitive", "insert", "int", "int1", "int2", "int3",
    "int4", "int8", "integer", "intersect", "interval", "into", "io_after_gtids",
    "io_before_gtids", "is", "iterate", "join", "json_table", "key", "keys", "kill",
    "lag", "last_value", "lateral", "lead", "leading", "leave", "left", "like", "limit",
    "linear", "lines", "load", "localtime", "localtimestamp", "lock", "long", "longblob",
    "longtext", "loop", "low_priority", "master_bind", "master_ssl_verify_server_cert",
    "match", "maxvalue", "mediumblob", "mediumint", "mediumtext", "middleint",
    "minute_microsecond", "minute_second", "mod", "modifies", "natural", "not",
    "no_write_to_binlog", "nth_value", "ntile", "null", "numeric", "of", "on",
    "optimize", "optimizer_costs", "option", "optionally", "or", "order", "out", "outer",
    "outfile", "over", "partition", "percent_rank", "precision", "primary", "procedure",
    "purge", "range", "rank", "read", "reads", "read_write", "real", "recursive",
    "references", "regexp", "release", "rename", "repeat", "replace", "require",
    "resignal", "restrict", "return", "revoke", "right", "rlike", "row", "rows",
    "row_number", "schema", "schemas", "second_microsecond", "select", "sensitive",
    "separator", "set", "show", "signal", "smallint", "spatial", "specific", "sql",
    "sqlexception", "sqlstate", "sqlwarning", "sql_big_result", "sql_calc_found_rows",
    "sql_small_result", "ssl", "starting", "stored", "straight_join", "system", "table",
    "terminated", "then", "tinyblob", "tinyint", "tinytext", "to", "trailing", "trigger",
    "true", "undo", "union", "unique", "unlock", "unsigned", "update", "usage", "use",
    "using", "utc_date", "utc_time", "utc_timestamp", "values", "varbinary", "varchar",
    "varcharacter", "varying", "virtual", "when", "where", "while", "window", "with",
    "write", "xor", "year_month", "zerofill",
];

fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.iter().any(|word| word.eq_ignore_ascii_case(name))
}

/// Validate a table identifier.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes
/// - Identifiers exceeding 64 bytes
/// - Anything other than ASCII letters, digits, `_` and `$`
/// - All-digit names and MySQL reserved words
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CopyError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(CopyError::Config(format!(
            "Identifier must be a bare word (letters, digits, '_' or '$'): {:?}",
            name
        )));
    }

    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(CopyError::Config(format!(
            "Identifier cannot consist solely of digits: {:?}",
            name
        )));
    }

    if is_reserved_word(name) {
        return Err(CopyError::Config(format!(
            "Identifier is a reserved MySQL word and would need quoting: {:?}",
            name
        )));
    }

    Ok(())
}

/// Validate a WHERE predicate or JOIN fragment.
///
/// Rejects semicolons (multiple statements) and SQL comment markers, which
/// would let a fragment swallow or append to the chunk's id condition. Only
/// text outside quotes counts: `foo.note <> 'a;b'` is fine. Quotes must be
/// balanced; backslash escapes inside literals follow the default `sql_mode`.
pub fn validate_fragment(fragment: &str) -> Result<()> {
    if fragment.trim().is_empty() {
        return Err(CopyError::Config("Filter fragment cannot be empty".into()));
    }

    let bytes = fragment.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        let next = bytes.get(i + 1).copied();
        match quote {
            Some(q) => {
                if byte == b'\\' && q != b'`' {
                    i += 2;
                    continue;
                }
                if byte == q {
                    // A doubled quote is an escaped quote character.
                    if next == Some(q) {
                        i += 2;
                        continue;
                    }
                    quote = None;
                }
            }
            None => match (byte, next) {
                (b'\'' | b'"' | b'`', _) => quote = Some(byte),
                (b';', _) => {
                    return Err(CopyError::Config(format!(
                        "SECURITY: Filter contains semicolon (possible injection): {:?}",
                        fragment
                    )));
                }
                (b'-', Some(b'-')) | (b'/', Some(b'*')) | (b'*', Some(b'/')) | (b'#', _) => {
                    return Err(CopyError::Config(format!(
                        "SECURITY: Filter contains SQL comment markers (possible injection): {:?}",
                        fragment
                    )));
                }
                _ => {}
            },
        }
        i += 1;
    }

    if let Some(q) = quote {
        return Err(CopyError::Config(format!(
            "Filter has an unterminated {} quote: {:?}",
            q as char, fragment
        )));
    }

    Ok(())
}
