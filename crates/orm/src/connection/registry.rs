//! Connection registry
//!
//! Owned by the application's composition root. One connection is kept per
//! structurally equal [`DatabaseConfig`]; nothing is global.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::executor::Connection;
use crate::backends::DatabaseDriver;
use crate::error::ModelResult;
use tessera_core::DatabaseConfig;

/// Memoizes connections by configuration value
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<DatabaseConfig, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the connection for `config`, connecting to MySQL on first use
    pub async fn open(&self, config: DatabaseConfig) -> ModelResult<Arc<Connection>> {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(&config) {
            return Ok(Arc::clone(existing));
        }

        let connection = Arc::new(Connection::open(config.clone()).await?);
        info!(fingerprint = %config.fingerprint(), "Opened database connection");
        connections.insert(config, Arc::clone(&connection));
        Ok(connection)
    }

    /// Like [`open`](Self::open) but builds the driver with `make` on first use
    pub async fn open_with<F>(&self, config: DatabaseConfig, make: F) -> Arc<Connection>
    where
        F: FnOnce(&DatabaseConfig) -> Arc<dyn DatabaseDriver>,
    {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(&config) {
            return Arc::clone(existing);
        }

        let driver = make(&config);
        let connection = Arc::new(Connection::with_driver(config.clone(), driver));
        info!(fingerprint = %config.fingerprint(), "Opened database connection");
        connections.insert(config, Arc::clone(&connection));
        connection
    }

    /// The already opened connection for `config`
    pub async fn get(&self, config: &DatabaseConfig) -> Option<Arc<Connection>> {
        self.connections.lock().await.get(config).cloned()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Close and forget the connection for `config`; false if none was open
    pub async fn close(&self, config: &DatabaseConfig) -> ModelResult<bool> {
        let removed = self.connections.lock().await.remove(config);
        match removed {
            Some(connection) => {
                connection.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close every open connection
    pub async fn close_all(&self) -> ModelResult<()> {
        let drained: Vec<_> = self.connections.lock().await.drain().map(|(_, c)| c).collect();
        for connection in drained {
            connection.close().await?;
        }
        Ok(())
    }
}
