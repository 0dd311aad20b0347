//! Authentication collaborator: a GoTrue-style token API consumed over
//! HTTP. The crate never stores password material; credentials are
//! forwarded once and the session lives in an HTTP-only cookie afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DashboardError;

/// An authenticated session as the handlers see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token carried by the session cookie.
    pub access_token: String,
    /// Owner id used to scope every store call.
    pub user_id: String,
    pub email: String,
}

/// Sign-in/sign-up/session contract against the external auth service.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, DashboardError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Session, DashboardError>;

    /// Resolves an access token back to its session, or fails with an auth
    /// error when the token is expired or revoked.
    async fn current_user(&self, access_token: &str) -> Result<Session, DashboardError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), DashboardError>;
}

/// HTTP implementation over the Supabase auth endpoints.
pub struct SupabaseAuth {
    http: reqwest::Client,
    auth_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    user: Option<UserResponse>,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: String,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: format!("{}/auth/v1", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DashboardError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DashboardError::Auth(format!("{}: {}", status, body)))
        }
    }

    fn session_from(token: TokenResponse) -> Result<Session, DashboardError> {
        let access_token = token
            .access_token
            .ok_or_else(|| DashboardError::Auth("no access token in response".into()))?;
        let user = token
            .user
            .ok_or_else(|| DashboardError::Auth("no user in response".into()))?;
        Ok(Session {
            access_token,
            user_id: user.id,
            email: user.email,
        })
    }
}

#[async_trait]
impl AuthClient for SupabaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, DashboardError> {
        let response = self
            .http
            .post(format!("{}/token?grant_type=password", self.auth_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| DashboardError::Auth(e.to_string()))?;

        let token: TokenResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DashboardError::Auth(e.to_string()))?;
        Self::session_from(token)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Session, DashboardError> {
        let response = self
            .http
            .post(format!("{}/signup", self.auth_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": { "nombre": name },
            }))
            .send()
            .await
            .map_err(|e| DashboardError::Auth(e.to_string()))?;

        let token: TokenResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DashboardError::Auth(e.to_string()))?;
        Self::session_from(token)
    }

    async fn current_user(&self, access_token: &str) -> Result<Session, DashboardError> {
        let response = self
            .http
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| DashboardError::Auth(e.to_string()))?;

        let user: UserResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DashboardError::Auth(e.to_string()))?;
        Ok(Session {
            access_token: access_token.to_string(),
            user_id: user.id,
            email: user.email,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), DashboardError> {
        let response = self
            .http
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| DashboardError::Auth(e.to_string()))?;
        Self::check(response).await.map(|_| ())
    }
}

/// Static auth client for tests and offline runs: any credential pair is
/// accepted and the user id is derived from the email.
pub struct StaticAuth;

#[async_trait]
impl AuthClient for StaticAuth {
    async fn sign_in(&self, email: &str, _password: &str) -> Result<Session, DashboardError> {
        Ok(Session {
            access_token: format!("token-{email}"),
            user_id: format!("user-{email}"),
            email: email.to_string(),
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _name: &str,
    ) -> Result<Session, DashboardError> {
        self.sign_in(email, password).await
    }

    async fn current_user(&self, access_token: &str) -> Result<Session, DashboardError> {
        match access_token.strip_prefix("token-") {
            Some(email) => Ok(Session {
                access_token: access_token.to_string(),
                user_id: format!("user-{email}"),
                email: email.to_string(),
            }),
            None => Err(DashboardError::Auth("unknown session".into())),
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), DashboardError> {
        Ok(())
    }
}
