//! Join/leave orchestration and the user-facing session API.

mod coordinator;
mod session;
mod state;

pub use coordinator::{Collaborators, ParticipantView, RoomJoinCoordinator};
pub use session::Session;
pub use state::JoinState;
