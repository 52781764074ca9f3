//! Explicit login session handed to `HttpTaskStore`.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::client::{decode, send};
use crate::errors::StoreError;
use crate::models::User;

/// A bearer token plus the user it was issued to, when known.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    token: String,
    user: Option<User>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
    user: User,
}

impl Session {
    /// Wrap a token obtained elsewhere (config, environment).
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub async fn register(
        base_url: &str,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Self, StoreError> {
        let req = Client::new()
            .post(format!("{}/auth/register", base_url.trim_end_matches('/')))
            .json(&RegisterRequest {
                username,
                email,
                password,
            });
        let resp: AuthResponse = decode(send(req).await?).await?;
        Ok(Self {
            token: resp.token,
            user: Some(resp.user),
        })
    }

    pub async fn login(base_url: &str, email: &str, password: &str) -> Result<Self, StoreError> {
        let req = Client::new()
            .post(format!("{}/auth/login", base_url.trim_end_matches('/')))
            .json(&LoginRequest { email, password });
        let resp: AuthResponse = decode(send(req).await?).await?;
        Ok(Self {
            token: resp.token,
            user: Some(resp.user),
        })
    }

    /// Fetch the user this token belongs to.
    pub async fn me(&self, base_url: &str) -> Result<User, StoreError> {
        let req = Client::new()
            .get(format!("{}/auth/me", base_url.trim_end_matches('/')))
            .bearer_auth(&self.token);
        decode(send(req).await?).await
    }

    /// Revoke the token server-side. The session is consumed.
    pub async fn logout(self, base_url: &str) -> Result<(), StoreError> {
        let req = Client::new()
            .post(format!("{}/auth/logout", base_url.trim_end_matches('/')))
            .bearer_auth(&self.token);
        send(req).await?;
        Ok(())
    }
}
