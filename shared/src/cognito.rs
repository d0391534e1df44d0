//! Cognito user pool as the identity provider.
//!
//! The app client has a secret, so every unauthenticated call carries a
//! `SECRET_HASH`. Display name and photo live in the standard `name` and
//! `picture` attributes.

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use doeklus_atoms::identity::{IdentityProvider, ProfileUpdate, SignUp};
use doeklus_atoms::{Identity, KlusError, Result, Session};

type HmacSha256 = Hmac<Sha256>;

pub struct CognitoIdentityProvider {
    client: CognitoClient,
    client_id: String,
    client_secret: String,
}

/// Base64(HMAC-SHA256(secret, username + client_id)).
pub fn secret_hash(username: &str, client_id: &str, client_secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| KlusError::Identity(format!("invalid client secret: {}", e)))?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn attribute(name: &str, value: &str) -> Result<AttributeType> {
    AttributeType::builder()
        .name(name)
        .value(value)
        .build()
        .map_err(|e| KlusError::Identity(e.to_string()))
}

impl CognitoIdentityProvider {
    pub fn new(client: CognitoClient, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    async fn identity(&self, access_token: &str) -> Result<Identity> {
        let user = self
            .client
            .get_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_authorized_exception() || service.is_user_not_found_exception() {
                    KlusError::Unauthenticated
                } else {
                    KlusError::Identity(format!("Cognito get_user error: {}", service))
                }
            })?;

        let attr = |name: &str| {
            user.user_attributes()
                .iter()
                .find(|a| a.name() == name)
                .and_then(|a| a.value())
                .map(str::to_string)
        };
        let uid = attr("sub").unwrap_or_else(|| user.username().to_string());
        let email = attr("email").unwrap_or_default();
        Ok(Identity {
            uid,
            display_name: attr("name").unwrap_or_default(),
            email,
            photo_url: attr("picture").filter(|p| !p.is_empty()),
        })
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn sign_up(&self, request: &SignUp) -> Result<Identity> {
        let email = request.email.trim().to_lowercase();
        let display_name = request.display_name.trim().to_string();
        let hash = secret_hash(&email, &self.client_id, &self.client_secret)?;

        let result = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .secret_hash(hash)
            .username(&email)
            .password(&request.password)
            .user_attributes(attribute("email", &email)?)
            .user_attributes(attribute("name", &display_name)?)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_username_exists_exception() {
                    KlusError::AccountExists { email: email.clone() }
                } else if service.is_invalid_password_exception()
                    || service.is_invalid_parameter_exception()
                {
                    KlusError::Validation(service.to_string())
                } else {
                    KlusError::Identity(format!("Cognito sign_up error: {}", service))
                }
            })?;

        tracing::info!("Cognito user {} signed up", result.user_sub());
        Ok(Identity {
            uid: result.user_sub().to_string(),
            display_name,
            email,
            photo_url: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim().to_lowercase();
        let hash = secret_hash(&email, &self.client_id, &self.client_secret)?;

        let result = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", &email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", hash)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_authorized_exception() || service.is_user_not_found_exception() {
                    KlusError::Unauthenticated
                } else {
                    KlusError::Identity(format!("Cognito initiate_auth error: {}", service))
                }
            })?;

        let token = result
            .authentication_result()
            .and_then(|r| r.access_token())
            .ok_or_else(|| KlusError::Identity("sign-in requires a further challenge".into()))?
            .to_string();
        let identity = self.identity(&token).await?;
        Ok(Session::new(identity, token))
    }

    async fn authenticate(&self, access_token: &str) -> Result<Session> {
        let identity = self.identity(access_token).await?;
        Ok(Session::new(identity, access_token))
    }

    async fn update_profile(&self, session: &Session, update: &ProfileUpdate) -> Result<Identity> {
        let mut attributes = Vec::new();
        if let Some(name) = &update.display_name {
            attributes.push(attribute("name", name)?);
        }
        if let Some(Some(url)) = &update.photo_url {
            attributes.push(attribute("picture", url)?);
        }
        if !attributes.is_empty() {
            self.client
                .update_user_attributes()
                .access_token(&session.access_token)
                .set_user_attributes(Some(attributes))
                .send()
                .await
                .map_err(|e| {
                    KlusError::Identity(format!(
                        "Cognito update_user_attributes error: {}",
                        e.into_service_error()
                    ))
                })?;
        }
        if let Some(None) = &update.photo_url {
            self.client
                .delete_user_attributes()
                .access_token(&session.access_token)
                .user_attribute_names("picture")
                .send()
                .await
                .map_err(|e| {
                    KlusError::Identity(format!(
                        "Cognito delete_user_attributes error: {}",
                        e.into_service_error()
                    ))
                })?;
        }
        self.identity(&session.access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_matches_the_cognito_recipe() {
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"anna@example.nlclient");
        let expected = STANDARD.encode(mac.finalize().into_bytes());

        let hash = secret_hash("anna@example.nl", "client", "secret").unwrap();
        assert_eq!(hash, expected);
        assert_eq!(STANDARD.decode(&hash).unwrap().len(), 32);
    }
}
