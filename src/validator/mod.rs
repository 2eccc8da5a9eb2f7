//! Token validation against the external account API
//!
//! A validator answers one question per token: does the API accept it, and
//! if so which display name does it report. Every failure mode (transport,
//! status, body) collapses into [`ValidationFailure`]; the checker treats
//! them all as "not currently valid".

pub mod account_api;

pub use account_api::AccountApiClient;

use crate::models::DueToken;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Why a token could not be confirmed. Informational only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Connection, TLS or timeout problem
    #[error("request failed: {0}")]
    Transport(String),

    /// Any status other than 200
    #[error("unexpected status code: {0}")]
    Status(u16),

    /// Body was not the expected JSON document
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// Checks one token. At most one outbound attempt per call, no retries.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// The display name reported for the token's account
    async fn validate(&self, token: &DueToken) -> Result<String, ValidationFailure>;
}

#[async_trait]
impl<T: TokenValidator + ?Sized> TokenValidator for Arc<T> {
    async fn validate(&self, token: &DueToken) -> Result<String, ValidationFailure> {
        (**self).validate(token).await
    }
}

/// Logs every validation outcome around an inner validator
pub struct LoggingValidator<V> {
    inner: V,
}

impl<V> LoggingValidator<V> {
    pub fn new(inner: V) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> V {
        self.inner
    }
}

#[async_trait]
impl<V: TokenValidator> TokenValidator for LoggingValidator<V> {
    async fn validate(&self, token: &DueToken) -> Result<String, ValidationFailure> {
        let result = self.inner.validate(token).await;

        match &result {
            Ok(name) => {
                let changed = *name != token.display_name;
                tracing::info!(
                    account.id = %token.key.account_id,
                    external_account.id = %token.key.external_account_id,
                    display_name.new = %name,
                    display_name.old = %token.display_name,
                    display_name.changed = changed,
                    "Token check succeeded"
                )
            }
            Err(e) => tracing::info!(
                account.id = %token.key.account_id,
                external_account.id = %token.key.external_account_id,
                error = %e,
                "Could not get account name"
            ),
        }

        result
    }
}
