pub mod send;
pub mod sendable;
pub mod sent_message;

pub use send::{AddressMap, SendAttributes};
pub use sendable::{HasSends, Model, ModelKey, ModelReference, Sendable};
pub use sent_message::{MailAddress, SentMessage};
