//! Token-link records as seen by the checker

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Identity of a token-link record and its paired account record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenKey {
    /// Owning account
    pub account_id: Uuid,
    /// Linked external account
    pub external_account_id: Uuid,
}

impl TokenKey {
    pub fn new(account_id: Uuid, external_account_id: Uuid) -> Self {
        Self {
            account_id,
            external_account_id,
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.external_account_id)
    }
}

/// A token due for re-check, joined with its account record
#[derive(Clone, PartialEq, Eq)]
pub struct DueToken {
    pub key: TokenKey,
    /// Credential presented to the account API
    pub api_token: String,
    /// Name currently cached on the account record
    pub display_name: String,
    pub last_valid_time: DateTime<Utc>,
    pub last_valid_check_time: DateTime<Utc>,
    pub last_name_check_time: DateTime<Utc>,
}

impl DueToken {
    /// The earlier of the two check timestamps; selection is ordered by it.
    pub fn staleness_key(&self) -> DateTime<Utc> {
        self.last_valid_check_time.min(self.last_name_check_time)
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for DueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DueToken")
            .field("key", &self.key)
            .field("api_token", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("last_valid_time", &self.last_valid_time)
            .field("last_valid_check_time", &self.last_valid_check_time)
            .field("last_name_check_time", &self.last_name_check_time)
            .finish()
    }
}

/// Result of validating one token, as persisted by the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The account API accepted the token and reported this name
    Valid { display_name: String },
    /// The check failed for any reason
    Invalid,
}

impl CheckOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, CheckOutcome::Valid { .. })
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid { .. } => write!(f, "VALID"),
            Self::Invalid => write!(f, "INVALID"),
        }
    }
}
