use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("invalid application key: {0}")]
    InvalidKey(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("the MAC is invalid")]
    Authentication,
    #[error("could not encrypt the data")]
    Encrypt,
    #[error("decrypted payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("invalid table name: {0:?}")]
    TableName(String),
}

/// Everything that can abort recording a sent message.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to decrypt header {header}: {source}")]
    Decrypt {
        header: String,
        #[source]
        source: EncryptionError,
    },
    #[error("models header is not a valid model list: {0}")]
    ModelsHeader(#[from] serde_json::Error),
    #[error("model type {0:?} is not registered")]
    UnknownModel(String),
    #[error("model {model} with id {id} not found")]
    ModelNotFound { model: String, id: String },
    #[error("model lookup failed: {0}")]
    Lookup(#[source] anyhow::Error),
    #[error("send attribute hook failed: {0}")]
    Hook(#[source] anyhow::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
