//! Symmetric encryption of header payloads.
//!
//! Payloads are AES-256-GCM sealed with the application key and shipped as
//! base64 encoded JSON envelopes: `{"iv", "value", "mac", "tag"}`. `mac` is
//! always empty because GCM authenticates through `tag`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EncryptionError;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_PREFIX: &str = "base64:";

pub trait Decrypter: Send + Sync {
    fn decrypt_string(&self, payload: &str) -> Result<String, EncryptionError>;
}

pub trait Encrypter: Send + Sync {
    fn encrypt_string(&self, value: &str) -> Result<String, EncryptionError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    iv: String,
    value: String,
    #[serde(default)]
    mac: String,
    #[serde(default)]
    tag: String,
}

/// Encrypter keyed with the 32 byte application key.
#[derive(Clone)]
pub struct AppKeyEncrypter {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for AppKeyEncrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppKeyEncrypter").finish_non_exhaustive()
    }
}

impl AppKeyEncrypter {
    pub fn new(key: &[u8]) -> Result<Self, EncryptionError> {
        if key.len() != KEY_SIZE {
            return Err(EncryptionError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Accepts `base64:<key>` as well as a bare base64 key.
    pub fn from_app_key(app_key: &str) -> Result<Self, EncryptionError> {
        let encoded = app_key.trim();
        let encoded = encoded.strip_prefix(KEY_PREFIX).unwrap_or(encoded);
        let key = BASE64
            .decode(encoded)
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        Self::new(&key)
    }

    /// Fresh random key in `base64:` form, suitable for `APP_KEY`.
    pub fn generate_key() -> String {
        let mut rng = rand::rng();
        let key: [u8; KEY_SIZE] = std::array::from_fn(|_| rng.random());
        format!("{KEY_PREFIX}{}", BASE64.encode(key))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
        let mut rng = rand::rng();
        let iv: [u8; NONCE_SIZE] = std::array::from_fn(|_| rng.random());

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| EncryptionError::Encrypt)?;
        let (value, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let envelope = Envelope {
            iv: BASE64.encode(iv),
            value: BASE64.encode(value),
            mac: String::new(),
            tag: BASE64.encode(tag),
        };
        let json = serde_json::to_vec(&envelope)
            .map_err(|e| EncryptionError::InvalidPayload(e.to_string()))?;
        Ok(BASE64.encode(json))
    }

    pub fn decrypt(&self, payload: &str) -> Result<Vec<u8>, EncryptionError> {
        // folded header values carry whitespace that is not part of the payload
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let json = BASE64
            .decode(compact.as_bytes())
            .map_err(|e| EncryptionError::InvalidPayload(e.to_string()))?;
        let envelope: Envelope = serde_json::from_slice(&json)
            .map_err(|e| EncryptionError::InvalidPayload(e.to_string()))?;

        let iv = decode_field("iv", &envelope.iv)?;
        if iv.len() != NONCE_SIZE {
            return Err(EncryptionError::InvalidPayload(format!(
                "iv must be {NONCE_SIZE} bytes, got {}",
                iv.len()
            )));
        }
        let tag = decode_field("tag", &envelope.tag)?;
        if tag.len() != TAG_SIZE {
            return Err(EncryptionError::InvalidPayload(format!(
                "tag must be {TAG_SIZE} bytes, got {}",
                tag.len()
            )));
        }
        let mut sealed = decode_field("value", &envelope.value)?;
        sealed.extend_from_slice(&tag);

        self.cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| EncryptionError::Authentication)
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, EncryptionError> {
    BASE64
        .decode(value)
        .map_err(|e| EncryptionError::InvalidPayload(format!("{name}: {e}")))
}

impl Encrypter for AppKeyEncrypter {
    fn encrypt_string(&self, value: &str) -> Result<String, EncryptionError> {
        self.encrypt(value.as_bytes())
    }
}

impl Decrypter for AppKeyEncrypter {
    fn decrypt_string(&self, payload: &str) -> Result<String, EncryptionError> {
        Ok(String::from_utf8(self.decrypt(payload)?)?)
    }
}
