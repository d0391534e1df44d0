pub mod memory;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::session::{Identity, Session};

pub use memory::MemoryIdentityProvider;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    /// `Some(None)` clears the photo.
    pub photo_url: Option<Option<String>>,
}

/// Credential sign-up/sign-in and the mutable public profile.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, request: &SignUp) -> Result<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Resolve an access token to the identity it belongs to.
    /// Fails with `KlusError::Unauthenticated` for unknown or expired tokens.
    async fn authenticate(&self, access_token: &str) -> Result<Session>;

    async fn update_profile(&self, session: &Session, update: &ProfileUpdate) -> Result<Identity>;
}
