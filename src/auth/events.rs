//! Session-change events emitted by the auth provider.

use serde::{Deserialize, Serialize};

use super::types::Session;

/// Kind of session change. Wire names follow the hosted auth SDK.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    /// Anything else (`INITIAL_SESSION`, `PASSWORD_RECOVERY`, ...).
    Other(String),
}

impl AuthEvent {
    pub fn from_wire(name: &str) -> Self {
        match name {
            "SIGNED_IN" => Self::SignedIn,
            "SIGNED_OUT" => Self::SignedOut,
            "TOKEN_REFRESHED" => Self::TokenRefreshed,
            "USER_UPDATED" => Self::UserUpdated,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for AuthEvent {
    fn from(name: String) -> Self {
        Self::from_wire(&name)
    }
}

impl From<AuthEvent> for String {
    fn from(event: AuthEvent) -> Self {
        event.as_str().to_string()
    }
}

impl std::fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delivery from the provider: `(event, session?)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChange {
    pub event: AuthEvent,
    #[serde(default)]
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(event: AuthEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }

    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthEvent::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthEvent::SignedOut, None)
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self::new(AuthEvent::TokenRefreshed, Some(session))
    }

    pub fn user_updated(session: Session) -> Self {
        Self::new(AuthEvent::UserUpdated, Some(session))
    }

    /// Email of the session user, for log lines.
    pub fn email(&self) -> &str {
        self.session.as_ref().map_or("no user", |s| s.email())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_wire_names_parse() {
        assert_eq!(AuthEvent::from_wire("SIGNED_IN"), AuthEvent::SignedIn);
        assert_eq!(AuthEvent::from_wire("SIGNED_OUT"), AuthEvent::SignedOut);
        assert_eq!(AuthEvent::from_wire("TOKEN_REFRESHED"), AuthEvent::TokenRefreshed);
        assert_eq!(AuthEvent::from_wire("USER_UPDATED"), AuthEvent::UserUpdated);
    }

    #[test]
    fn unknown_wire_name_is_preserved() {
        let event = AuthEvent::from_wire("PASSWORD_RECOVERY");
        assert_eq!(event, AuthEvent::Other("PASSWORD_RECOVERY".into()));
        assert_eq!(event.to_string(), "PASSWORD_RECOVERY");
    }

    #[test]
    fn change_deserializes_from_json() {
        let json = r#"{
            "event": "TOKEN_REFRESHED",
            "session": { "access_token": "abc", "user": { "id": "u1" } }
        }"#;
        let change: AuthChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.event, AuthEvent::TokenRefreshed);
        assert_eq!(change.session.unwrap().access_token, "abc");
    }

    #[test]
    fn change_without_session() {
        let change: AuthChange = serde_json::from_str(r#"{"event":"SIGNED_OUT"}"#).unwrap();
        assert_eq!(change, AuthChange::signed_out());
        assert_eq!(change.email(), "no user");
    }

    #[test]
    fn event_serializes_to_wire_name() {
        let json = serde_json::to_string(&AuthEvent::UserUpdated).unwrap();
        assert_eq!(json, r#""USER_UPDATED""#);
    }
}
