use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{IdentityProvider, ProfileUpdate, SignUp};
use crate::error::{KlusError, Result};
use crate::session::{Identity, Session};

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password_hash: String,
}

/// Identity provider kept in memory; passwords are stored as salted SHA-256.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    tokens: RwLock<HashMap<String, String>>,
}

fn hash_password(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn identity_for(&self, uid: &str) -> Option<Identity> {
        self.accounts
            .read()
            .await
            .values()
            .find(|a| a.identity.uid == uid)
            .map(|a| a.identity.clone())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up(&self, request: &SignUp) -> Result<Identity> {
        let email = request.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(KlusError::Validation("a valid email address is required".into()));
        }
        if request.password.len() < 8 {
            return Err(KlusError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(KlusError::AccountExists { email });
        }
        let identity = Identity {
            uid: uuid::Uuid::new_v4().to_string(),
            display_name: request.display_name.trim().to_string(),
            email: email.clone(),
            photo_url: None,
        };
        accounts.insert(
            email.clone(),
            Account {
                identity: identity.clone(),
                password_hash: hash_password(&email, &request.password),
            },
        );
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim().to_lowercase();
        let identity = {
            let accounts = self.accounts.read().await;
            match accounts.get(&email) {
                Some(account) if account.password_hash == hash_password(&email, password) => {
                    account.identity.clone()
                }
                _ => return Err(KlusError::Unauthenticated),
            }
        };
        let token = uuid::Uuid::new_v4().to_string();
        self.tokens
            .write()
            .await
            .insert(token.clone(), identity.uid.clone());
        Ok(Session::new(identity, token))
    }

    async fn authenticate(&self, access_token: &str) -> Result<Session> {
        let uid = self
            .tokens
            .read()
            .await
            .get(access_token)
            .cloned()
            .ok_or(KlusError::Unauthenticated)?;
        let identity = self
            .identity_for(&uid)
            .await
            .ok_or(KlusError::Unauthenticated)?;
        Ok(Session::new(identity, access_token))
    }

    async fn update_profile(&self, session: &Session, update: &ProfileUpdate) -> Result<Identity> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .values_mut()
            .find(|a| a.identity.uid == session.uid())
            .ok_or(KlusError::Unauthenticated)?;
        if let Some(name) = &update.display_name {
            account.identity.display_name = name.trim().to_string();
        }
        if let Some(photo) = &update.photo_url {
            account.identity.photo_url = photo.clone();
        }
        Ok(account.identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(email: &str) -> SignUp {
        SignUp {
            email: email.into(),
            password: "geheim123".into(),
            display_name: "Jan".into(),
        }
    }

    #[tokio::test]
    async fn sign_up_sign_in_authenticate() {
        let idp = MemoryIdentityProvider::new();
        let identity = idp.sign_up(&signup("Jan@Example.nl")).await.unwrap();
        assert_eq!(identity.email, "jan@example.nl");

        let session = idp.sign_in("jan@example.nl", "geheim123").await.unwrap();
        assert_eq!(session.uid(), identity.uid);

        let again = idp.authenticate(&session.access_token).await.unwrap();
        assert_eq!(again.identity, identity);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_token_are_unauthenticated() {
        let idp = MemoryIdentityProvider::new();
        idp.sign_up(&signup("jan@example.nl")).await.unwrap();
        assert!(matches!(
            idp.sign_in("jan@example.nl", "verkeerd!").await,
            Err(KlusError::Unauthenticated)
        ));
        assert!(matches!(
            idp.authenticate("nope").await,
            Err(KlusError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_rejected() {
        let idp = MemoryIdentityProvider::new();
        idp.sign_up(&signup("jan@example.nl")).await.unwrap();
        assert!(matches!(
            idp.sign_up(&signup("Jan@example.nl")).await,
            Err(KlusError::AccountExists { email }) if email == "jan@example.nl"
        ));
    }

    #[tokio::test]
    async fn update_profile_changes_name_and_photo() {
        let idp = MemoryIdentityProvider::new();
        idp.sign_up(&signup("jan@example.nl")).await.unwrap();
        let session = idp.sign_in("jan@example.nl", "geheim123").await.unwrap();
        let updated = idp
            .update_profile(
                &session,
                &ProfileUpdate {
                    display_name: Some("Jan de Klusser".into()),
                    photo_url: Some(Some("memory://p.jpg".into())),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Jan de Klusser");
        assert_eq!(updated.photo_url.as_deref(), Some("memory://p.jpg"));
    }
}
