use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;

use crate::config::Tables;
use crate::db::queries;
use crate::models::send;

/// Lookup key of an application model: integer or string primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKey::Int(id) => write!(f, "{id}"),
            ModelKey::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for ModelKey {
    fn from(id: i64) -> Self {
        ModelKey::Int(id)
    }
}

impl From<&str> for ModelKey {
    fn from(id: &str) -> Self {
        ModelKey::Str(id.to_string())
    }
}

/// One element of the models header: `{"model": "App\\User", "id": 1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReference {
    pub model: String,
    pub id: ModelKey,
}

impl ModelReference {
    pub fn new(model: impl Into<String>, id: impl Into<ModelKey>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

/// Pivot identity of a model attached to a Send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sendable {
    pub sendable_type: String,
    pub sendable_id: String,
}

/// An application entity resolved from a model reference.
pub trait Model: Send + Sync + fmt::Debug {
    fn model_type(&self) -> &str;

    fn key(&self) -> &ModelKey;

    /// Models that can own Sends return themselves here.
    fn as_has_sends(&self) -> Option<&dyn HasSends> {
        None
    }
}

#[async_trait]
pub trait HasSends: Send + Sync {
    fn sendable(&self) -> Sendable;

    /// Sends attached to this model, newest first.
    async fn sends(
        &self,
        pool: &SqlitePool,
        tables: &Tables,
    ) -> Result<Vec<send::Send>, sqlx::Error> {
        queries::sends_for_sendable(pool, tables, &self.sendable()).await
    }
}
