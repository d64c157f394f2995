//! `Connection` implementation over `mysql_async`.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, DriverError, Opts, OptsBuilder, Pool, SslOpts};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::{Connection, SqlWarning};
use crate::error::{CopyError, Result};

const IDENTITY_SQL: &str = "SELECT @@hostname, @@port";

/// One MySQL session, re-established from the pool after a dropped connection.
pub struct MysqlConnection {
    pool: Pool,
    conn: Option<Conn>,
}

impl MysqlConnection {
    /// Connect using the `database` section of the configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts(&config.ssl_mode) {
            builder = builder.ssl_opts(ssl);
        }

        let opts: Opts = builder.into();
        let pool = Pool::new(opts);

        let mut conn = pool.get_conn().await?;
        conn.query_drop("SELECT 1").await?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            conn: Some(conn),
        })
    }

    /// Close the session and the pool.
    pub async fn disconnect(mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect().await?;
        }
        self.pool.disconnect().await?;
        Ok(())
    }

    async fn session(&mut self) -> Result<&mut Conn> {
        if self.conn.is_none() {
            debug!("Re-establishing MySQL session");
            self.conn = Some(self.pool.get_conn().await.map_err(classify)?);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| CopyError::sql("MySQL session unavailable"))
    }

    /// Map a driver error, forgetting the session when it is no longer usable.
    fn fail(&mut self, error: mysql_async::Error) -> CopyError {
        if is_disconnect(&error) {
            self.conn = None;
        }
        classify(error)
    }
}

fn ssl_opts(ssl_mode: &str) -> Option<SslOpts> {
    match ssl_mode.to_lowercase().as_str() {
        "disable" => {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
            None
        }
        "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
        "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => Some(SslOpts::default()),
        other => {
            warn!("Unknown ssl_mode '{}', defaulting to prefer", other);
            Some(SslOpts::default().with_danger_accept_invalid_certs(true))
        }
    }
}

fn is_disconnect(error: &mysql_async::Error) -> bool {
    matches!(
        error,
        mysql_async::Error::Io(_) | mysql_async::Error::Driver(DriverError::ConnectionClosed)
    )
}

/// Dropped sessions are reported in the server's own wording so retry rules match them.
fn classify(error: mysql_async::Error) -> CopyError {
    if is_disconnect(&error) {
        CopyError::sql(format!("Lost connection to MySQL server during query ({})", error))
    } else {
        CopyError::Mysql(error)
    }
}

#[async_trait]
impl Connection for MysqlConnection {
    async fn select_value(&mut self, sql: &str) -> Result<Option<i64>> {
        let result = self.session().await?.query_first::<Option<i64>, _>(sql).await;
        match result {
            Ok(row) => Ok(row.flatten()),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn select_values(&mut self, sql: &str) -> Result<Vec<i64>> {
        let result = self.session().await?.query::<i64, _>(sql).await;
        result.map_err(|e| self.fail(e))
    }

    async fn update(&mut self, sql: &str) -> Result<u64> {
        let conn = self.session().await?;
        let result = conn.query_drop(sql).await.map(|()| conn.affected_rows());
        result.map_err(|e| self.fail(e))
    }

    async fn show_warnings(&mut self) -> Result<Vec<SqlWarning>> {
        let result = self
            .session()
            .await?
            .query::<(String, u32, String), _>("SHOW WARNINGS")
            .await;
        let rows = result.map_err(|e| self.fail(e))?;
        Ok(rows
            .into_iter()
            .map(|(level, code, message)| SqlWarning::new(level, code, message))
            .collect())
    }

    async fn server_identity(&mut self) -> Result<Option<String>> {
        let result = self
            .session()
            .await?
            .query_first::<(String, u16), _>(IDENTITY_SQL)
            .await;
        let row = result.map_err(|e| self.fail(e))?;
        Ok(row.map(|(host, port)| format!("{}:{}", host, port)))
    }
}
