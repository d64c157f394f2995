//! Database driver implementations.
//!
//! - [`mysql`]: [`Connection`](crate::core::Connection) over `mysql_async`

pub mod mysql;

pub use mysql::MysqlConnection;
