//! Records outgoing mail as Sends and links them to the application models
//! named in the message headers.

pub mod config;
pub mod db;
pub mod encryption;
pub mod error;
pub mod models;
pub mod services;
pub mod smtp;
pub mod telemetry;

pub use config::{Config, SendsConfig};
pub use encryption::{AppKeyEncrypter, Decrypter, Encrypter};
pub use error::RecordError;
pub use services::{ModelRegistry, OutgoingMailRecorder};
