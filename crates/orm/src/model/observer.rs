//! Lifecycle hooks for model records
//!
//! An observer is attached to a [`ModelDefinition`](super::ModelDefinition)
//! and called by the repository around every write and after every load.
//! `before_*` hooks can decline the operation by returning `false`.

use async_trait::async_trait;

use super::record::Model;
use super::validation::ValidationErrors;
use crate::error::ModelResult;

#[async_trait]
pub trait ModelObserver: Send + Sync {
    /// Add messages to `errors` for anything the declared rules cannot express
    fn validate(&self, _model: &Model, _errors: &mut ValidationErrors) {}

    async fn before_save(&self, _model: &mut Model) -> ModelResult<bool> {
        Ok(true)
    }

    async fn after_save(&self, _model: &mut Model) -> ModelResult<()> {
        Ok(())
    }

    async fn before_delete(&self, _model: &Model) -> ModelResult<bool> {
        Ok(true)
    }

    async fn after_delete(&self, _model: &Model) -> ModelResult<()> {
        Ok(())
    }

    /// Runs once per record hydrated by a query or refreshed by `reload`
    async fn after_load(&self, _model: &mut Model) -> ModelResult<()> {
        Ok(())
    }
}
