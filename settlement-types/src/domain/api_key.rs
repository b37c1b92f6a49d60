//! API Key domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ApiKeyId, UserId};

/// An API key for authenticating requests.
///
/// A key without a `user_id` is an admin key: it may create users and
/// vouchers but cannot move money.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub name: String,
    pub key_hash: String,
    pub user_id: Option<UserId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Creates a new API key with the given name and hash.
    pub fn new(name: String, key_hash: String, user_id: Option<UserId>) -> Self {
        Self {
            id: ApiKeyId::new(),
            name,
            key_hash,
            user_id,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user_id.is_none()
    }
}
