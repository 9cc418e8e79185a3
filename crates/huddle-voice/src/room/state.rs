use std::fmt;

/// Lifecycle of the local participant's room membership.
///
/// ```text
/// Idle --begin_join--> Joining --complete_join--> Joined
///   ^                     |                          |
///   |                 abort_join                begin_leave
///   |                     v                          v
///   +------------------- Idle <--finish_leave--- Leaving
/// ```
///
/// `begin_leave` is also accepted from `Joining`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinState {
    #[default]
    Idle,
    Joining,
    Joined,
    Leaving,
}

impl JoinState {
    /// Applies a transition if it is legal from the current state.
    fn transition(&mut self, from: &[JoinState], to: JoinState) -> bool {
        if from.contains(self) {
            *self = to;
            true
        } else {
            false
        }
    }

    pub fn begin_join(&mut self) -> bool {
        self.transition(&[JoinState::Idle], JoinState::Joining)
    }

    pub fn complete_join(&mut self) -> bool {
        self.transition(&[JoinState::Joining], JoinState::Joined)
    }

    pub fn abort_join(&mut self) -> bool {
        self.transition(&[JoinState::Joining], JoinState::Idle)
    }

    pub fn begin_leave(&mut self) -> bool {
        self.transition(&[JoinState::Joined, JoinState::Joining], JoinState::Leaving)
    }

    pub fn finish_leave(&mut self) -> bool {
        self.transition(&[JoinState::Leaving], JoinState::Idle)
    }

    pub fn is_idle(self) -> bool {
        self == JoinState::Idle
    }
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinState::Idle => "idle",
            JoinState::Joining => "joining",
            JoinState::Joined => "joined",
            JoinState::Leaving => "leaving",
        };
        f.write_str(s)
    }
}
