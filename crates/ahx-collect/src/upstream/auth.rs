//! Upstream access tokens (OAuth client-credentials grant).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::error::FetchError;

/// Anything that can hand out a bearer token for upstream calls.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn token(&self) -> Result<String, FetchError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

/// POSTs `grant_type=client_credentials` with HTTP basic auth.
pub struct ClientCredentials {
    http: reqwest::Client,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(http: reqwest::Client, oauth_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            http,
            oauth_url: oauth_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

#[async_trait]
impl AccessTokenSource for ClientCredentials {
    async fn token(&self) -> Result<String, FetchError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(FetchError::Auth("client id and secret are required".into()));
        }

        let resp = self
            .http
            .post(&self.oauth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| FetchError::Auth(e.to_string()))?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(FetchError::Status { url: self.oauth_url.clone(), status });
        }

        let body: TokenResponse = resp.json().await.map_err(|e| FetchError::Auth(e.to_string()))?;
        info!("[auth] refreshed access token (expires in {}s)", body.expires_in);
        Ok(body.access_token)
    }
}

/// Fixed token, for tests and pre-provisioned deployments.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn token(&self) -> Result<String, FetchError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credentials_fail_before_network() {
        let source = ClientCredentials::new(reqwest::Client::new(), "http://127.0.0.1:9/token", "", "");
        assert!(matches!(source.token().await, Err(FetchError::Auth(_))));
        assert_eq!(StaticToken("t".into()).token().await.unwrap(), "t");
    }
}
