//! Profile endpoint interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::UserProfile;

/// Reply from the "current user" endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProfileResponse {
    pub fn ok(user: UserProfile) -> Self {
        Self {
            success: true,
            user: Some(user),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            error: Some(error.into()),
        }
    }

    /// The profile, if the call succeeded and carried one.
    pub fn into_profile(self) -> Option<UserProfile> {
        if self.success {
            self.user
        } else {
            None
        }
    }
}

/// Fetches the authoritative profile for a bearer token.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// `Err` is a transport/server failure; `Ok` with `success: false` is
    /// an application-level refusal.
    async fn fetch_profile(&self, bearer_token: &str) -> anyhow::Result<ProfileResponse>;
}
