/// Persists a Send for every outgoing message and links it to its models
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::SendsConfig;
use crate::db::queries;
use crate::encryption::Decrypter;
use crate::error::RecordError;
use crate::models::send;
use crate::models::{AddressMap, Model, ModelReference, SendAttributes, Sendable, SentMessage};
use crate::services::model_registry::ModelRegistry;

/// Adjusts the default attributes before the Send is stored.
pub trait AttributeHook: Send + Sync {
    fn apply(
        &self,
        message: &SentMessage,
        attrs: SendAttributes,
    ) -> anyhow::Result<SendAttributes>;
}

impl<F> AttributeHook for F
where
    F: Fn(&SentMessage, SendAttributes) -> anyhow::Result<SendAttributes> + Send + Sync,
{
    fn apply(
        &self,
        message: &SentMessage,
        attrs: SendAttributes,
    ) -> anyhow::Result<SendAttributes> {
        self(message, attrs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSend {
    pub send: send::Send,
    pub attached: Vec<Sendable>,
}

pub struct OutgoingMailRecorder {
    pool: SqlitePool,
    config: SendsConfig,
    decrypter: Arc<dyn Decrypter>,
    models: ModelRegistry,
    hook: Option<Box<dyn AttributeHook>>,
}

impl OutgoingMailRecorder {
    pub fn new(
        pool: SqlitePool,
        config: SendsConfig,
        decrypter: Arc<dyn Decrypter>,
        models: ModelRegistry,
    ) -> Self {
        Self {
            pool,
            config,
            decrypter,
            models,
            hook: None,
        }
    }

    pub fn with_attribute_hook(mut self, hook: impl AttributeHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &SendsConfig {
        &self.config
    }

    /// Stores the Send first, then attaches models. A failure while attaching
    /// leaves the Send row in place.
    pub async fn handle(&self, message: &SentMessage) -> Result<RecordedSend, RecordError> {
        let send = self.create_send(message).await?;
        let attached = self.attach_models(message, &send).await?;
        Ok(RecordedSend { send, attached })
    }

    async fn create_send(&self, message: &SentMessage) -> Result<send::Send, RecordError> {
        let defaults = self.default_attributes(message)?;
        let attrs = match &self.hook {
            Some(hook) => hook.apply(message, defaults).map_err(RecordError::Hook)?,
            None => defaults,
        };

        let send = queries::insert_send(&self.pool, &self.config.tables, attrs).await?;
        tracing::info!(
            send_id = send.id,
            uuid = ?send.uuid,
            mail_class = ?send.mail_class,
            "outgoing mail recorded"
        );
        Ok(send)
    }

    pub fn default_attributes(&self, message: &SentMessage) -> Result<SendAttributes, RecordError> {
        Ok(SendAttributes {
            uuid: self.send_uuid(message),
            mail_class: self.mail_class(message)?,
            subject: message.subject.clone(),
            content: self.content(message),
            from: AddressMap::from_addresses(&message.from),
            reply_to: AddressMap::from_addresses(&message.reply_to),
            to: AddressMap::from_addresses(&message.to),
            cc: AddressMap::from_addresses(&message.cc),
            bcc: AddressMap::from_addresses(&message.bcc),
            sent_at: Utc::now(),
        })
    }

    pub fn send_uuid(&self, message: &SentMessage) -> Option<String> {
        if self.config.uses_message_id() {
            return message.message_id.clone();
        }
        message
            .header(&self.config.headers.send_uuid)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn mail_class(&self, message: &SentMessage) -> Result<Option<String>, RecordError> {
        self.decrypt_header(message, &self.config.headers.mail_class)
    }

    pub fn content(&self, message: &SentMessage) -> Option<String> {
        if !self.config.store_content {
            return None;
        }
        message.html_body.clone()
    }

    /// Models named in the models header that can own Sends.
    pub async fn models(&self, message: &SentMessage) -> Result<Vec<Box<dyn Model>>, RecordError> {
        let Some(plain) = self.decrypt_header(message, &self.config.headers.models)? else {
            return Ok(Vec::new());
        };
        let references: Vec<ModelReference> =
            serde_json::from_str::<Option<_>>(&plain)?.unwrap_or_default();

        let mut models = Vec::with_capacity(references.len());
        for reference in &references {
            let model = self.models.resolve(&self.pool, reference).await?;
            if model.as_has_sends().is_none() {
                tracing::debug!(
                    model = %reference.model,
                    id = %reference.id,
                    "model cannot own sends, skipped"
                );
                continue;
            }
            models.push(model);
        }
        Ok(models)
    }

    async fn attach_models(
        &self,
        message: &SentMessage,
        send: &send::Send,
    ) -> Result<Vec<Sendable>, RecordError> {
        let mut attached = Vec::new();
        for model in self.models(message).await? {
            let Some(owner) = model.as_has_sends() else {
                continue;
            };
            let sendable = owner.sendable();
            queries::attach_sendable(&self.pool, &self.config.tables, send.id, &sendable).await?;
            tracing::debug!(
                send_id = send.id,
                sendable_type = %sendable.sendable_type,
                sendable_id = %sendable.sendable_id,
                "model attached to send"
            );
            attached.push(sendable);
        }
        Ok(attached)
    }

    fn decrypt_header(
        &self,
        message: &SentMessage,
        header: &str,
    ) -> Result<Option<String>, RecordError> {
        let Some(raw) = message.header(header) else {
            return Ok(None);
        };
        self.decrypter
            .decrypt_string(raw)
            .map(Some)
            .map_err(|source| RecordError::Decrypt {
                header: header.to_string(),
                source,
            })
    }
}
