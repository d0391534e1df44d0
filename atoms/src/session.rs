use serde::{Deserialize, Serialize};

/// Who the identity provider says a caller is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Authenticated caller context, passed explicitly into every lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub access_token: String,
}

impl Session {
    pub fn new(identity: Identity, access_token: impl Into<String>) -> Self {
        Self {
            identity,
            access_token: access_token.into(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.identity.uid
    }

    /// Name shown to other users; falls back to the local part of the email.
    pub fn display_name(&self) -> &str {
        let name = self.identity.display_name.trim();
        if name.is_empty() {
            self.identity.email.split('@').next().unwrap_or("Gebruiker")
        } else {
            name
        }
    }
}
