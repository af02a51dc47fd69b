//! The executor's datastore seam.
//!
//! [`QueryConnection`] abstracts over how statements actually run, so the
//! executor's limit/timeout/truncation logic is testable without a server.
//! The production implementation wraps a pooled `tokio-postgres` client.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::debug;

use super::normalize;
use crate::query::Value;

/// Errors from the connection layer.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("datastore error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("{0}")]
    Other(String),
}

/// A result column: output name plus portable type name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    pub name: String,
    pub data_type: String,
}

/// Raw fetched results, already normalized to portable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Value>>,
}

/// Async connection used by the query executor.
///
/// Implementations must apply/restore the per-connection statement timeout
/// themselves; the executor calls the pair around every fetch regardless of
/// outcome.
#[async_trait]
pub trait QueryConnection: Send + Sync {
    /// Run a parameterized statement and return normalized results.
    async fn fetch(&self, sql: &str, params: &[Value]) -> Result<ResultSet, ConnectionError>;

    /// Apply a per-connection statement timeout.
    async fn set_statement_timeout(&self, timeout: Duration) -> Result<(), ConnectionError>;

    /// Restore the connection's default statement timeout.
    async fn reset_statement_timeout(&self) -> Result<(), ConnectionError>;
}

/// `tokio-postgres` backed connection.
pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    /// Wrap an already-connected client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with a libpq-style connection string and drive the connection
    /// task in the background.
    pub async fn connect(config: &str) -> Result<Self, ConnectionError> {
        let (client, connection) = tokio_postgres::connect(config, NoTls).await?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection task ended");
            }
        });

        Ok(Self { client })
    }
}

#[async_trait]
impl QueryConnection for PgConnection {
    async fn fetch(&self, sql: &str, params: &[Value]) -> Result<ResultSet, ConnectionError> {
        // Prepare first so column metadata exists even for empty results.
        let statement = self.client.prepare(sql).await?;

        let columns = statement
            .columns()
            .iter()
            .map(|c| ResultColumn {
                name: c.name().to_string(),
                data_type: normalize::portable_type_name(c.type_()),
            })
            .collect();

        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = self.client.query(&statement, &param_refs).await?;
        debug!(rows = rows.len(), "statement returned");

        Ok(ResultSet {
            columns,
            rows: rows.iter().map(normalize::normalize_row).collect(),
        })
    }

    async fn set_statement_timeout(&self, timeout: Duration) -> Result<(), ConnectionError> {
        let millis = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        self.client
            .batch_execute(&format!("SET statement_timeout = {}", millis))
            .await?;
        Ok(())
    }

    async fn reset_statement_timeout(&self) -> Result<(), ConnectionError> {
        self.client.batch_execute("RESET statement_timeout").await?;
        Ok(())
    }
}
