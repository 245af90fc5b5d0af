//! HTTP client for hosting provider and release APIs

use std::time::Duration;

use http::{header, Method};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::EngineError;

/// How a request authenticates against an upstream API
#[derive(Debug, Clone)]
pub enum ApiAuth {
    None,
    /// `Authorization: Bearer <token>` (GitHub)
    Bearer(SecretString),
    /// `PRIVATE-TOKEN: <token>` (GitLab)
    PrivateToken(SecretString),
    /// `Authorization: token <token>` (Gitea)
    Token(SecretString),
}

/// Thin reqwest wrapper shared by the provider clients
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deployd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    fn request(&self, method: Method, url: &str, auth: &ApiAuth) -> RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");

        match auth {
            ApiAuth::None => request,
            ApiAuth::Bearer(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            ApiAuth::PrivateToken(token) => request.header("PRIVATE-TOKEN", token.expose_secret()),
            ApiAuth::Token(token) => request.header(
                header::AUTHORIZATION,
                format!("token {}", token.expose_secret()),
            ),
        }
    }

    async fn check(response: reqwest::Response, method: &str) -> Result<reqwest::Response, EngineError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("HTTP {} failed: {} - {}", method, status, body);

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EngineError::AuthError(format!("{}: {}", status, body)));
        }
        Err(EngineError::UpstreamError(format!("{}: {}", status, body)))
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, url: &str, auth: &ApiAuth) -> Result<T, EngineError> {
        debug!("GET {}", url);

        let response = self.request(Method::GET, url, auth).send().await?;
        let response = Self::check(response, "GET").await?;

        let body = response.json().await?;
        Ok(body)
    }

    /// Make a POST request, discarding the response body
    pub async fn post<B: Serialize>(
        &self,
        url: &str,
        auth: &ApiAuth,
        body: &B,
    ) -> Result<(), EngineError> {
        debug!("POST {}", url);

        let response = self.request(Method::POST, url, auth).json(body).send().await?;
        Self::check(response, "POST").await?;
        Ok(())
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str, auth: &ApiAuth) -> Result<(), EngineError> {
        debug!("DELETE {}", url);

        let response = self.request(Method::DELETE, url, auth).send().await?;
        Self::check(response, "DELETE").await?;
        Ok(())
    }

    /// Make a HEAD request and report whether it completed (any status)
    pub async fn head(&self, url: &str) -> Result<(), EngineError> {
        debug!("HEAD {}", url);

        self.client.head(url).send().await?;
        Ok(())
    }
}
