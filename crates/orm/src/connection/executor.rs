//! The connection handle
//!
//! Owns one driver, rewrites named parameters, logs every statement and
//! keeps the table-metadata cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, error, warn};

use super::metadata::{primary_key_of, ColumnMeta, SchemaCache};
use super::statistics::{StatementStats, StatsSnapshot};
use crate::backends::{DatabaseDriver, ExecOutcome, MySqlDriver, Row};
use crate::error::{ModelError, ModelResult};
use crate::sql::{bind_named, escape_like, quote_table, Params};
use crate::value::Value;
use tessera_core::logging::SQL_TARGET;
use tessera_core::{DatabaseConfig, ErrorPolicy};

/// Types built one-per-row by [`Connection::query_typed`]
pub trait Hydrate: Sized {
    /// Construction context shared by every row (a model definition, say)
    type Seed: ?Sized;

    fn hydrate(seed: &Self::Seed, row: Row) -> ModelResult<Self>;
}

impl Hydrate for Row {
    type Seed = ();

    fn hydrate(_: &(), row: Row) -> ModelResult<Self> {
        Ok(row)
    }
}

impl Hydrate for serde_json::Value {
    type Seed = ();

    fn hydrate(_: &(), row: Row) -> ModelResult<Self> {
        Ok(row.to_json())
    }
}

/// A database connection plus its metadata cache
pub struct Connection {
    driver: Arc<dyn DatabaseDriver>,
    config: DatabaseConfig,
    columns: DashMap<String, Arc<Vec<ColumnMeta>>>,
    existing_tables: DashMap<String, bool>,
    schema_cache: Option<Arc<dyn SchemaCache>>,
    stats: StatementStats,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.driver.backend_name())
            .field("config", &self.config)
            .field("cached_tables", &self.columns.len())
            .finish()
    }
}

impl Connection {
    /// Connect to MySQL using `config`
    pub async fn open(config: DatabaseConfig) -> ModelResult<Self> {
        let driver = MySqlDriver::connect(&config).await?;
        Ok(Self::with_driver(config, Arc::new(driver)))
    }

    /// Wrap an already constructed driver
    pub fn with_driver(config: DatabaseConfig, driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            driver,
            config,
            columns: DashMap::new(),
            existing_tables: DashMap::new(),
            schema_cache: None,
            stats: StatementStats::default(),
        }
    }

    /// Put an external cache behind the in-memory metadata map
    pub fn with_schema_cache(mut self, cache: Arc<dyn SchemaCache>) -> Self {
        self.schema_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run a SELECT and return its rows
    pub async fn query_rows(&self, sql: &str, params: &Params) -> ModelResult<Vec<Row>> {
        Ok(self.try_query_rows(sql, params).await?.unwrap_or_default())
    }

    /// Like [`query_rows`](Self::query_rows), but `None` when the statement
    /// failed and the error policy swallowed it
    pub async fn try_query_rows(&self, sql: &str, params: &Params) -> ModelResult<Option<Vec<Row>>> {
        let (positional, values) = bind_named(sql, params)?;
        let started = Instant::now();
        let result = self.driver.fetch_all(&positional, &values).await;
        let elapsed = started.elapsed();

        match result {
            Ok(rows) => {
                let slow = self.is_slow(elapsed);
                self.stats.record(false, elapsed, false, slow);
                log_success(sql, &values, "rows", rows.len() as u64, elapsed, slow);
                Ok(Some(rows))
            }
            Err(err) => {
                self.stats.record(false, elapsed, true, false);
                self.fail(sql, &values, err, elapsed).map(|_| None)
            }
        }
    }

    /// Run a SELECT and build one `T` per row, columns in driver order
    pub async fn query_typed<T: Hydrate>(&self, sql: &str, params: &Params, seed: &T::Seed) -> ModelResult<Vec<T>> {
        self.query_rows(sql, params)
            .await?
            .into_iter()
            .map(|row| T::hydrate(seed, row))
            .collect()
    }

    /// First column of the first row, if any
    pub async fn query_scalar(&self, sql: &str, params: &Params) -> ModelResult<Option<Value>> {
        Ok(self
            .query_rows(sql, params)
            .await?
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next().map(|(_, value)| value)))
    }

    /// Run a write statement and return the affected row count
    pub async fn execute(&self, sql: &str, params: &Params) -> ModelResult<u64> {
        Ok(self.execute_write(sql, params).await?.rows_affected)
    }

    /// Run a write statement and return its full outcome
    ///
    /// A failure swallowed by the error policy comes back with `failed` set.
    pub async fn execute_write(&self, sql: &str, params: &Params) -> ModelResult<ExecOutcome> {
        let (positional, values) = bind_named(sql, params)?;
        let started = Instant::now();
        let result = self.driver.execute(&positional, &values).await;
        let elapsed = started.elapsed();

        match result {
            Ok(outcome) => {
                let slow = self.is_slow(elapsed);
                self.stats.record(true, elapsed, false, slow);
                log_success(sql, &values, "affected", outcome.rows_affected, elapsed, slow);
                Ok(outcome)
            }
            Err(err) => {
                self.stats.record(true, elapsed, true, false);
                self.fail(sql, &values, err, elapsed).map(|_| ExecOutcome::swallowed())
            }
        }
    }

    /// Ordered column metadata of `table`
    pub async fn table_columns(&self, table: &str) -> ModelResult<Arc<Vec<ColumnMeta>>> {
        if let Some(columns) = self.columns.get(table) {
            return Ok(Arc::clone(columns.value()));
        }

        let cache_key = self.cache_key("columns", table);
        if let Some(cache) = &self.schema_cache {
            if let Some(bytes) = cache.get(&cache_key).await? {
                let columns: Vec<ColumnMeta> = serde_json::from_slice(&bytes)
                    .map_err(|e| ModelError::Cache(format!("Corrupt column cache for '{}': {}", table, e)))?;
                let columns = Arc::new(columns);
                self.columns.insert(table.to_string(), Arc::clone(&columns));
                return Ok(columns);
            }
        }

        let sql = format!("SHOW COLUMNS FROM {}", quote_table(table));
        let Some(rows) = self.try_query_rows(&sql, &Params::new()).await? else {
            return Ok(Arc::new(Vec::new()));
        };
        let columns = rows
            .iter()
            .map(ColumnMeta::from_show_columns)
            .collect::<ModelResult<Vec<_>>>()?;

        // a table without columns does not exist; nothing to cache
        if columns.is_empty() {
            return Ok(Arc::new(columns));
        }

        if let Some(cache) = &self.schema_cache {
            cache.put(&cache_key, serde_json::to_vec(&columns)?).await?;
        }
        debug!(table, columns = columns.len(), "Cached table columns");
        let columns = Arc::new(columns);
        self.columns.insert(table.to_string(), Arc::clone(&columns));
        Ok(columns)
    }

    /// The single primary-key column of `table`
    pub async fn table_primary_key(&self, table: &str) -> ModelResult<Option<String>> {
        let columns = self.table_columns(table).await?;
        primary_key_of(table, &columns)
    }

    /// Whether `table` exists in the current database
    pub async fn table_exists(&self, table: &str) -> ModelResult<bool> {
        if let Some(exists) = self.existing_tables.get(table) {
            return Ok(*exists.value());
        }

        let cache_key = self.cache_key("exists", table);
        if let Some(cache) = &self.schema_cache {
            if let Some(bytes) = cache.get(&cache_key).await? {
                let exists = bytes.first() == Some(&1);
                self.existing_tables.insert(table.to_string(), exists);
                return Ok(exists);
            }
        }

        let params = Params::new().with("table", escape_like(table));
        let Some(rows) = self.try_query_rows("SHOW TABLES LIKE :table", &params).await? else {
            // a swallowed failure says nothing about the table
            return Ok(false);
        };
        let exists = !rows.is_empty();

        if let Some(cache) = &self.schema_cache {
            cache.put(&cache_key, vec![u8::from(exists)]).await?;
        }
        self.existing_tables.insert(table.to_string(), exists);
        Ok(exists)
    }

    /// Close the driver's pool
    pub async fn close(&self) -> ModelResult<()> {
        debug!(backend = self.driver.backend_name(), "Closing connection");
        self.driver.close().await
    }

    fn cache_key(&self, kind: &str, table: &str) -> String {
        format!("tessera:{}:{}:{}", self.config.fingerprint(), kind, table)
    }

    fn is_slow(&self, elapsed: Duration) -> bool {
        self.config
            .slow_query_ms
            .is_some_and(|threshold| elapsed.as_millis() >= u128::from(threshold))
    }

    /// Log a failed statement and apply the configured error policy
    fn fail(&self, sql: &str, values: &[Value], err: ModelError, elapsed: Duration) -> ModelResult<()> {
        error!(
            target: SQL_TARGET,
            sql,
            params = ?values,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %err,
            "Statement failed"
        );
        match (self.config.error_policy, err.is_statement()) {
            (ErrorPolicy::Swallow, true) => Ok(()),
            (_, _) => Err(err),
        }
    }
}

fn log_success(sql: &str, values: &[Value], unit: &str, count: u64, elapsed: Duration, slow: bool) {
    let elapsed_ms = elapsed.as_millis() as u64;
    if slow {
        warn!(target: SQL_TARGET, sql, params = ?values, unit, count, elapsed_ms, "Slow statement");
    } else {
        debug!(target: SQL_TARGET, sql, params = ?values, unit, count, elapsed_ms, "Statement executed");
    }
}
