//! HTTP login against the backend and the cached login snapshot.

pub mod cache;

use tracing::{error, info};

use crate::errors::ClientError;
use crate::models::{LoginRequest, LoginResponse};

pub use cache::LoginCache;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn login_url(&self) -> String {
        format!("{}/auth/login", self.base_url)
    }

    /// `POST /auth/login` with the user's email.
    pub async fn login(&self, email: &str) -> Result<LoginResponse, ClientError> {
        let resp = self
            .http
            .post(self.login_url())
            .json(&LoginRequest { email: email.to_string() })
            .send()
            .await
            .map_err(ClientError::Http)?;

        if !resp.status().is_success() {
            error!(status = %resp.status(), "Login request failed");
            return Err(ClientError::LoginRejected { status: resp.status().as_u16() });
        }

        let login = resp.json::<LoginResponse>().await.map_err(ClientError::Http)?;
        info!(user_id = %login.user_id, workspaces = login.workspaces.len(), "Logged in");
        Ok(login)
    }

    /// Reuses the cached login when present, else logs in and caches it.
    pub async fn login_cached(&self, cache: &LoginCache, email: &str) -> Result<LoginResponse, ClientError> {
        if let Some(cached) = cache.load()? {
            if cached.email == email {
                info!(user_id = %cached.user_id, "Using cached login");
                return Ok(cached);
            }
        }
        let login = self.login(email).await?;
        cache.store(&login)?;
        Ok(login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_ignores_trailing_slash() {
        assert_eq!(ApiClient::new("http://127.0.0.1:8000/").login_url(), "http://127.0.0.1:8000/auth/login");
    }

    #[tokio::test]
    async fn cached_login_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LoginCache::in_dir(dir.path());
        let login = LoginResponse {
            user_id: "u1".to_string(),
            email: "dev@example.com".to_string(),
            workspaces: vec![],
            models: vec!["m1".to_string()],
        };
        cache.store(&login).unwrap();

        // Unroutable base: any network attempt would fail the test.
        let client = ApiClient::new("http://127.0.0.1:9");
        assert_eq!(client.login_cached(&cache, "dev@example.com").await.unwrap(), login);
    }
}
