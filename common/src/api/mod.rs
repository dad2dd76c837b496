//! Typed client for the assistant backend's REST API.

mod admin;
mod ai;

use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::session::SessionProvider;

pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: Arc<dyn SessionProvider>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request_id = Uuid::new_v4();
        log::debug!("{} {} (request {})", method, path, request_id);

        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-Request-Id", request_id.to_string());
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let err = ApiError::from_status(status.as_u16(), &body);
        log::warn!("{} returned {}: {}", url, status, err.user_message());
        if let ApiError::Unauthorized { .. } = err {
            self.session.on_unauthorized();
        }
        Err(err)
    }

    async fn get(&self, path: &str) -> Result<String, ApiError> {
        self.execute(self.request(Method::GET, path)).await
    }

    async fn send_empty(&self, method: Method, path: &str) -> Result<String, ApiError> {
        self.execute(self.request(method, path)).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<String, ApiError> {
        self.execute(self.request(method, path).json(body)).await
    }
}

/// Validate a value spliced into a URL path.
fn segment(value: &str) -> Result<&str, ApiError> {
    let value = value.trim();
    let reserved = |c: char| matches!(c, '/' | '?' | '#') || c.is_whitespace();
    if value.is_empty() || value.contains(reserved) {
        return Err(ApiError::Validation(format!("invalid identifier: {:?}", value)));
    }
    Ok(value)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::session::StaticSession;

    pub fn client_for(server: &mockito::Server, token: Option<&str>) -> ApiClient {
        let config = ApiConfig {
            base_url: format!("{}/api/v1", server.url()),
            ..ApiConfig::default()
        };
        ApiClient::new(&config, Arc::new(StaticSession::new(token.map(str::to_string)))).unwrap()
    }
}
