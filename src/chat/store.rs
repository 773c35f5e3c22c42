//! Interfaces to the chat platform the summarizer reads from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SummaryError;

/// A message as the chat platform stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    pub author_id: String,
    pub channel_id: String,
    /// Root of the thread this message replies to; `None` for top-level messages.
    pub root_id: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on every edit. Part of the conversation fingerprint.
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    /// Joins, leaves, header changes and other platform-generated messages.
    pub is_system: bool,
    pub attachment_count: u32,
}

impl ChannelMessage {
    /// The id of the thread this message belongs to.
    #[must_use]
    pub fn thread_root(&self) -> &str {
        self.root_id
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub display_name: String,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The root message and all of its replies, in any order.
    async fn thread(&self, root_id: &str) -> Result<Vec<ChannelMessage>, SummaryError>;

    /// Messages in `channel_id` created at or after `since`, in any order.
    async fn messages_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChannelMessage>, SummaryError>;

    async fn message(&self, message_id: &str) -> Result<ChannelMessage, SummaryError>;

    /// Human-readable channel name. Defaults to the id.
    async fn channel_display_name(&self, channel_id: &str) -> Result<String, SummaryError> {
        Ok(channel_id.to_string())
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Profiles for as many of `user_ids` as can be found.
    async fn resolve_many(&self, user_ids: &[String]) -> Result<Vec<UserProfile>, SummaryError>;

    async fn resolve(&self, user_id: &str) -> Result<UserProfile, SummaryError>;
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn is_member(&self, channel_id: &str, user_id: &str) -> Result<bool, SummaryError>;
}
