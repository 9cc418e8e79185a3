pub mod errors;
pub mod events;
pub mod id;

pub use errors::{ConfigError, HuddleError, VoiceError};
pub use events::EventBus;
pub use id::{new_correlation_id, new_id, ParticipantId, RoomId};

pub type Result<T> = std::result::Result<T, HuddleError>;
