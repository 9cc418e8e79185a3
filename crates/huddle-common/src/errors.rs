use std::path::PathBuf;

use crate::id::ParticipantId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failure conditions of the voice coordination layer.
///
/// `NotReady`, `DeviceUnavailable` and `RoomFull` are local, expected
/// outcomes that are rolled back and reported to the user. The other two
/// come from the transport and are either swallowed (best-effort cleanup)
/// or isolated to a single peer link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    #[error("not ready: {0}")]
    NotReady(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("room is full ({capacity} participants)")]
    RoomFull { capacity: usize },

    #[error("signaling failure: {0}")]
    SignalingFailure(String),

    #[error("peer connection error with {participant}: {reason}")]
    PeerConnectionError {
        participant: ParticipantId,
        reason: String,
    },
}

impl VoiceError {
    /// Returns `true` for conditions that are shown to the user as a join
    /// outcome rather than treated as a transport fault.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            VoiceError::NotReady(_) | VoiceError::DeviceUnavailable(_) | VoiceError::RoomFull { .. }
        )
    }

    pub fn peer(participant: &ParticipantId, reason: impl Into<String>) -> Self {
        VoiceError::PeerConnectionError {
            participant: participant.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("room.max_participants".into());
        assert_eq!(
            err.to_string(),
            "config validation error: room.max_participants"
        );
    }

    #[test]
    fn voice_error_display() {
        let err = VoiceError::RoomFull { capacity: 8 };
        assert_eq!(err.to_string(), "room is full (8 participants)");

        let err = VoiceError::DeviceUnavailable("permission denied".into());
        assert_eq!(err.to_string(), "audio device unavailable: permission denied");

        let err = VoiceError::peer(&ParticipantId::from("p-2"), "ice failed");
        assert_eq!(err.to_string(), "peer connection error with p-2: ice failed");
    }

    #[test]
    fn user_facing_split() {
        assert!(VoiceError::NotReady("no identity".into()).is_user_facing());
        assert!(VoiceError::DeviceUnavailable("busy".into()).is_user_facing());
        assert!(VoiceError::RoomFull { capacity: 2 }.is_user_facing());
        assert!(!VoiceError::SignalingFailure("closed".into()).is_user_facing());
        assert!(!VoiceError::peer(&ParticipantId::from("x"), "reset").is_user_facing());
    }

    #[test]
    fn huddle_error_from_voice() {
        let err: HuddleError = VoiceError::RoomFull { capacity: 4 }.into();
        assert!(matches!(err, HuddleError::Voice(VoiceError::RoomFull { capacity: 4 })));
        assert!(err.to_string().contains("room is full"));
    }

    #[test]
    fn huddle_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: HuddleError = config_err.into();
        assert!(matches!(err, HuddleError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn huddle_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: HuddleError = io_err.into();
        assert!(matches!(err, HuddleError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
