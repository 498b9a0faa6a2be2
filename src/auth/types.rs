//! Identity records shared by the reconciler and its collaborators.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned to a synthesized profile when the session carries none.
pub const DEFAULT_ROLE: &str = "user";

/// Status assigned to a synthesized profile.
pub const ACTIVE_STATUS: &str = "active";

/// Free-form metadata the auth provider stores next to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The user half of a provider session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Proof of authentication issued by the auth provider.
///
/// Read-only to the reconciler. A missing token deserializes as the empty
/// string and is treated the same as a too-short one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access_token: String,
    /// Expiry as Unix epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

impl Session {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            access_token: token.into(),
            expires_at: None,
            user: SessionUser {
                id: user_id.into(),
                email: Some(email.into()),
                user_metadata: UserMetadata::default(),
            },
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Email address, or `""` when the provider has none.
    pub fn email(&self) -> &str {
        self.user.email.as_deref().unwrap_or_default()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Whether the token is present and at least `min_len` bytes long.
    pub fn has_usable_token(&self, min_len: usize) -> bool {
        !self.access_token.is_empty() && self.access_token.len() >= min_len
    }

    /// Minimal profile built from session fields alone.
    ///
    /// Used when the profile endpoint is skipped or unavailable.
    pub fn fallback_profile(&self) -> UserProfile {
        let email = self.email().to_string();
        let name = self
            .user
            .user_metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.clone());
        let role = self
            .user
            .user_metadata
            .role
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());

        UserProfile {
            id: self.user.id.clone(),
            email,
            name,
            role,
            status: ACTIVE_STATUS.to_string(),
        }
    }
}

/// Authoritative identity record served by the backend profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

fn default_status() -> String {
    ACTIVE_STATUS.to_string()
}

/// Point-in-time view of the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub user: Option<UserProfile>,
    pub access_token: Option<String>,
    pub is_authenticated: bool,
}

impl StoreSnapshot {
    /// The signed-out snapshot.
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn holds_user(&self, user_id: &str) -> bool {
        self.user_id() == Some(user_id)
    }
}

/// Partial store update. `None` leaves a field unchanged; `Some(None)`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub user: Option<Option<UserProfile>>,
    pub access_token: Option<Option<String>>,
}

impl StatePatch {
    pub fn user(profile: UserProfile, token: String) -> Self {
        Self {
            user: Some(Some(profile)),
            access_token: Some(Some(token)),
        }
    }

    pub fn token(token: String) -> Self {
        Self {
            user: None,
            access_token: Some(Some(token)),
        }
    }

    pub fn clear() -> Self {
        Self {
            user: Some(None),
            access_token: Some(None),
        }
    }

    /// Apply onto a snapshot, re-deriving `is_authenticated`.
    pub fn apply(self, snapshot: &mut StoreSnapshot) {
        if let Some(user) = self.user {
            snapshot.user = user;
        }
        if let Some(token) = self.access_token {
            snapshot.access_token = token;
        }
        snapshot.is_authenticated = snapshot.user.is_some();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_deserializes_provider_shape() {
        let json = r#"{
            "access_token": "eyJhbGciOiJIUzI1NiJ9.payload.sig",
            "expires_at": 1736570091,
            "user": {
                "id": "u1",
                "email": "ana@example.com",
                "user_metadata": { "name": "Ana", "role": "seller" }
            }
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.user_id(), "u1");
        assert_eq!(session.email(), "ana@example.com");
        assert_eq!(session.expires_at().unwrap().timestamp(), 1_736_570_091);
        assert!(session.has_usable_token(20));
    }

    #[test]
    fn missing_token_is_not_usable() {
        let json = r#"{ "user": { "id": "u1" } }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert!(session.access_token.is_empty());
        assert!(!session.has_usable_token(20));
        assert!(!session.has_usable_token(0));
    }

    #[test]
    fn short_token_is_not_usable() {
        let session = Session::new("u1", "a@b.c", "short");
        assert!(!session.has_usable_token(20));
    }

    #[test]
    fn fallback_profile_uses_email_and_default_role() {
        let session = Session::new("u1", "ana@example.com", "t".repeat(32));
        let profile = session.fallback_profile();
        assert_eq!(
            profile,
            UserProfile {
                id: "u1".into(),
                email: "ana@example.com".into(),
                name: "ana@example.com".into(),
                role: "user".into(),
                status: "active".into(),
            }
        );
    }

    #[test]
    fn fallback_profile_prefers_metadata() {
        let mut session = Session::new("u1", "ana@example.com", "t".repeat(32));
        session.user.user_metadata = UserMetadata {
            name: Some("Ana".into()),
            role: Some("admin".into()),
        };
        let profile = session.fallback_profile();
        assert_eq!(profile.name, "Ana");
        assert_eq!(profile.role, "admin");
    }

    #[test]
    fn fallback_profile_without_email() {
        let json = r#"{ "access_token": "x", "user": { "id": "u9" } }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        let profile = session.fallback_profile();
        assert_eq!(profile.email, "");
        assert_eq!(profile.name, "");
    }

    #[test]
    fn patch_keeps_authenticated_in_step_with_user() {
        let mut snap = StoreSnapshot::signed_out();
        let profile = Session::new("u1", "a@b.c", "tok").fallback_profile();

        StatePatch::user(profile, "tok".into()).apply(&mut snap);
        assert!(snap.is_authenticated);
        assert!(snap.holds_user("u1"));

        StatePatch::token("tok2".into()).apply(&mut snap);
        assert!(snap.is_authenticated);
        assert_eq!(snap.access_token.as_deref(), Some("tok2"));

        StatePatch::clear().apply(&mut snap);
        assert_eq!(snap, StoreSnapshot::signed_out());
    }

    #[test]
    fn profile_defaults_role_and_status() {
        let profile: UserProfile = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(profile.role, "user");
        assert_eq!(profile.status, "active");
    }
}
