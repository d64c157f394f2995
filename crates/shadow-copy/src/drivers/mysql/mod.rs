//! MySQL/MariaDB driver.
//!
//! [`MysqlConnection`] pins one session from a `mysql_async` pool, so
//! `SHOW WARNINGS` always reads the warnings of the statement that ran just
//! before it on the same session.
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod connection;

pub use connection::MysqlConnection;
