use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::Profile;

#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub name_set: bool,
    /// Optional bearer token for authenticated relays.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("name_set", &self.name_set)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl Default for Identity {
    /// The placeholder identity a client starts with before the user has
    /// picked a name. It is never allowed into a room.
    fn default() -> Self {
        Self {
            user_id: String::new(),
            display_name: String::new(),
            name_set: false,
            access_token: None,
        }
    }
}

impl Identity {
    /// Fresh identity with a random user id and the host name as a
    /// provisional display name.
    pub fn generate(hostname: &str) -> Self {
        Self {
            user_id: Uuid::new_v4().to_string(),
            display_name: hostname.to_string(),
            name_set: false,
            access_token: None,
        }
    }

    pub fn named(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            name_set: true,
            access_token: None,
        }
    }

    /// Whether this identity may join a room: the user picked a name and
    /// both id and name are non-empty.
    pub fn is_ready(&self) -> bool {
        self.name_set && !self.user_id.trim().is_empty() && !self.display_name.trim().is_empty()
    }

    pub(crate) fn profile(&self, muted: bool) -> Profile {
        Profile {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            muted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_identity_is_not_ready() {
        assert!(!Identity::default().is_ready());
    }

    #[test]
    fn generated_identity_needs_a_chosen_name() {
        let mut identity = Identity::generate("workstation");
        assert!(!identity.is_ready());
        identity.name_set = true;
        assert!(identity.is_ready());
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(!Identity::named("u-1", "   ").is_ready());
        assert!(!Identity::named("", "alice").is_ready());
        assert!(Identity::named("u-1", "alice").is_ready());
    }

    #[test]
    fn debug_redacts_token() {
        let mut identity = Identity::named("u-1", "alice");
        identity.access_token = Some("secret".into());
        let debug = format!("{identity:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
