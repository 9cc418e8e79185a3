//! Full-mesh peer link management.

mod link;
mod manager;

pub use link::LinkInfo;
pub use manager::PeerSessionManager;
