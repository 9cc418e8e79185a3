use std::sync::Arc;
use std::time::{Duration, Instant};

use huddle_common::ParticipantId;

use crate::ports::PeerConnection;

/// Everything owned on behalf of one remote participant.
pub(crate) struct PeerLink {
    pub(crate) remote: ParticipantId,
    /// Distinguishes this link from earlier links to the same participant.
    pub(crate) generation: u64,
    pub(crate) initiator: bool,
    pub(crate) connection: Arc<dyn PeerConnection>,
    pub(crate) sink_attached: bool,
    pub(crate) analysis_attached: bool,
    created_at: Instant,
}

impl PeerLink {
    pub(crate) fn new(
        remote: ParticipantId,
        generation: u64,
        initiator: bool,
        connection: Arc<dyn PeerConnection>,
    ) -> Self {
        Self {
            remote,
            generation,
            initiator,
            connection,
            sink_attached: false,
            analysis_attached: false,
            created_at: Instant::now(),
        }
    }

    pub(crate) fn info(&self) -> LinkInfo {
        LinkInfo {
            participant_id: self.remote.clone(),
            initiator: self.initiator,
            streaming: self.sink_attached,
            analysed: self.analysis_attached,
            age: self.created_at.elapsed(),
        }
    }
}

/// Read-only view of a link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub participant_id: ParticipantId,
    pub initiator: bool,
    /// Remote audio is attached to a render sink.
    pub streaming: bool,
    pub analysed: bool,
    pub age: Duration,
}
