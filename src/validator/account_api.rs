//! HTTP client for the account-info endpoint
//!
//! `GET {endpoint}?v={api_version}&access_token={token}`, expecting
//! `200 OK` with a JSON object carrying a string `name`.
//!
//! A 200 without `name` is reported as [`ValidationFailure::MalformedBody`],
//! so the token is recorded as not validated. A success therefore always
//! carries a name to store. The cost: a token the API still accepts but whose
//! body lacks `name` ages toward the validity timeout until the API answers
//! normally again.

use super::{TokenValidator, ValidationFailure};
use crate::config::ValidatorConfig;
use crate::models::DueToken;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct AccountResponse {
    name: String,
}

/// Account API client
#[derive(Debug, Clone)]
pub struct AccountApiClient {
    http: reqwest::Client,
    endpoint: String,
    api_version: String,
}

impl AccountApiClient {
    /// Create a client with its own connection pool and request timeout
    pub fn new(config: &ValidatorConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("token-checker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(
            http,
            config.endpoint.clone(),
            config.api_version.clone(),
        ))
    }

    /// Create from an existing HTTP client
    pub fn with_client(http: reqwest::Client, endpoint: String, api_version: String) -> Self {
        Self {
            http,
            endpoint,
            api_version,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the account name for a token. One attempt, no retries.
    pub async fn fetch_account_name(&self, api_token: &str) -> Result<String, ValidationFailure> {
        // Errors are stripped of their URL: the query string carries the token.
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("v", self.api_version.as_str()), ("access_token", api_token)])
            .send()
            .await
            .map_err(|e| ValidationFailure::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ValidationFailure::Status(status.as_u16()));
        }

        let body: AccountResponse = response
            .json()
            .await
            .map_err(|e| ValidationFailure::MalformedBody(e.without_url().to_string()))?;

        Ok(body.name)
    }
}

#[async_trait]
impl TokenValidator for AccountApiClient {
    async fn validate(&self, token: &DueToken) -> Result<String, ValidationFailure> {
        self.fetch_account_name(&token.api_token).await
    }
}
