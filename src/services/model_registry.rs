/// Resolution of `{model, id}` references into application models
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{check_identifier, ModelTable};
use crate::error::{ConfigError, RecordError};
use crate::models::{HasSends, Model, ModelKey, ModelReference, Sendable};

#[async_trait]
pub trait ModelResolver: Send + Sync {
    /// `Ok(None)` when no model has this key.
    async fn find(
        &self,
        pool: &SqlitePool,
        key: &ModelKey,
    ) -> anyhow::Result<Option<Box<dyn Model>>>;
}

/// Model type identifiers mapped to the resolver that loads them.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    resolvers: HashMap<String, Arc<dyn ModelResolver>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.resolvers.keys().collect();
        types.sort();
        f.debug_struct("ModelRegistry").field("types", &types).finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        model_type: impl Into<String>,
        resolver: impl ModelResolver + 'static,
    ) -> &mut Self {
        self.resolvers.insert(model_type.into(), Arc::new(resolver));
        self
    }

    pub fn with(
        mut self,
        model_type: impl Into<String>,
        resolver: impl ModelResolver + 'static,
    ) -> Self {
        self.register(model_type, resolver);
        self
    }

    /// Registry of plain table lookups, as configured through `SENDS_MODELS`.
    pub fn from_tables(tables: &[ModelTable]) -> Result<Self, ConfigError> {
        let mut registry = ModelRegistry::new();
        for t in tables {
            let mut resolver = TableResolver::new(&t.model_type, &t.table)?;
            if t.has_sends {
                resolver = resolver.with_sends();
            }
            registry.register(t.model_type.clone(), resolver);
        }
        Ok(registry)
    }

    pub fn is_registered(&self, model_type: &str) -> bool {
        self.resolvers.contains_key(model_type)
    }

    pub async fn resolve(
        &self,
        pool: &SqlitePool,
        reference: &ModelReference,
    ) -> Result<Box<dyn Model>, RecordError> {
        let resolver = self
            .resolvers
            .get(&reference.model)
            .ok_or_else(|| RecordError::UnknownModel(reference.model.clone()))?;

        resolver
            .find(pool, &reference.id)
            .await
            .map_err(RecordError::Lookup)?
            .ok_or_else(|| RecordError::ModelNotFound {
                model: reference.model.clone(),
                id: reference.id.to_string(),
            })
    }
}

/// Looks models up by primary key in an application table.
#[derive(Debug, Clone)]
pub struct TableResolver {
    model_type: String,
    table: String,
    key_column: String,
    has_sends: bool,
}

impl TableResolver {
    pub fn new(
        model_type: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let table = table.into();
        check_identifier(&table)?;
        Ok(Self {
            model_type: model_type.into(),
            table,
            key_column: "id".into(),
            has_sends: false,
        })
    }

    pub fn key_column(mut self, column: impl Into<String>) -> Result<Self, ConfigError> {
        let column = column.into();
        check_identifier(&column)?;
        self.key_column = column;
        Ok(self)
    }

    /// Rows of this table can be attached to Sends.
    pub fn with_sends(mut self) -> Self {
        self.has_sends = true;
        self
    }
}

#[async_trait]
impl ModelResolver for TableResolver {
    async fn find(
        &self,
        pool: &SqlitePool,
        key: &ModelKey,
    ) -> anyhow::Result<Option<Box<dyn Model>>> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            self.table, self.key_column
        );
        let query = sqlx::query_scalar::<_, i64>(&sql);
        let query = match key {
            ModelKey::Int(id) => query.bind(*id),
            ModelKey::Str(id) => query.bind(id.clone()),
        };
        if query.fetch_one(pool).await? == 0 {
            return Ok(None);
        }

        Ok(Some(Box::new(TableRow {
            model_type: self.model_type.clone(),
            key: key.clone(),
            has_sends: self.has_sends,
        })))
    }
}

#[derive(Debug, Clone)]
pub struct TableRow {
    model_type: String,
    key: ModelKey,
    has_sends: bool,
}

impl Model for TableRow {
    fn model_type(&self) -> &str {
        &self.model_type
    }

    fn key(&self) -> &ModelKey {
        &self.key
    }

    fn as_has_sends(&self) -> Option<&dyn HasSends> {
        if self.has_sends {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl HasSends for TableRow {
    fn sendable(&self) -> Sendable {
        Sendable {
            sendable_type: self.model_type.clone(),
            sendable_id: self.key.to_string(),
        }
    }
}
