use serde::Deserialize;
use std::env;

use crate::error::ConfigError;

/// Header name that selects the transport message id as the Send uuid.
pub const MESSAGE_ID_HEADER: &str = "Message-ID";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub app_key: String,
    pub sends: SendsConfig,
    pub models: Vec<ModelTable>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://mailora_sends.db".into());
        let app_key = env::var("APP_KEY").map_err(|_| ConfigError::Missing("APP_KEY"))?;
        let sends = SendsConfig::from_env()?;
        let models = match env::var("SENDS_MODELS") {
            Ok(entries) => ModelTable::parse_list(&entries)?,
            Err(_) => Vec::new(),
        };

        Ok(Config {
            database_url,
            app_key,
            sends,
            models,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SendsConfig {
    pub tables: Tables,
    pub headers: HeaderNames,
    pub store_content: bool,
}

impl Default for SendsConfig {
    fn default() -> Self {
        Self {
            tables: Tables::default(),
            headers: HeaderNames::default(),
            store_content: false,
        }
    }
}

impl SendsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = SendsConfig::default();
        if let Ok(v) = env::var("SENDS_TABLE") {
            config.tables.sends = v;
        }
        if let Ok(v) = env::var("SENDS_PIVOT_TABLE") {
            config.tables.sendables = v;
        }
        if let Ok(v) = env::var("SENDS_HEADER_UUID") {
            config.headers.send_uuid = v;
        }
        if let Ok(v) = env::var("SENDS_HEADER_MAIL_CLASS") {
            config.headers.mail_class = v;
        }
        if let Ok(v) = env::var("SENDS_HEADER_MODELS") {
            config.headers.models = v;
        }
        if let Ok(v) = env::var("SENDS_STORE_CONTENT") {
            config.store_content = parse_flag("SENDS_STORE_CONTENT", &v)?;
        }
        config.tables.validate()?;
        Ok(config)
    }

    pub fn uses_message_id(&self) -> bool {
        self.headers.send_uuid.eq_ignore_ascii_case(MESSAGE_ID_HEADER)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub sends: String,
    pub sendables: String,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            sends: "sends".into(),
            sendables: "sendables".into(),
        }
    }
}

impl Tables {
    /// Table names are interpolated into SQL, so only plain identifiers pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier(&self.sends)?;
        check_identifier(&self.sendables)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeaderNames {
    pub send_uuid: String,
    pub mail_class: String,
    pub models: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            send_uuid: "X-Mailora-Send-UUID".into(),
            mail_class: "X-Mailora-Mail-Class".into(),
            models: "X-Mailora-Mail-Models".into(),
        }
    }
}

/// One `SENDS_MODELS` entry: `Type=table` or `Type=table:sends`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTable {
    pub model_type: String,
    pub table: String,
    pub has_sends: bool,
}

impl ModelTable {
    pub fn parse_list(entries: &str) -> Result<Vec<Self>, ConfigError> {
        entries
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid {
            name: "SENDS_MODELS",
            value: entry.to_string(),
        };
        let (model_type, target) = entry.split_once('=').ok_or_else(invalid)?;
        let (table, has_sends) = match target.split_once(':') {
            Some((table, "sends")) => (table, true),
            Some(_) => return Err(invalid()),
            None => (target, false),
        };
        let model_type = model_type.trim();
        if model_type.is_empty() {
            return Err(invalid());
        }
        let table = table.trim().to_string();
        check_identifier(&table)?;

        Ok(ModelTable {
            model_type: model_type.to_string(),
            table,
            has_sends,
        })
    }
}

pub(crate) fn check_identifier(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::TableName(name.to_string()))
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}
