pub mod model_registry;
pub mod recorder_service;

pub use model_registry::{ModelRegistry, ModelResolver, TableResolver};
pub use recorder_service::{AttributeHook, OutgoingMailRecorder, RecordedSend};
