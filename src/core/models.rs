use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::types::TokenUsage;
use crate::errors::SummaryError;

/// What a summary covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    /// One root message and its replies.
    Thread,
    /// A channel over a bounded time window.
    Channel,
}

impl SummaryKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryKind {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(Self::Thread),
            "channel" => Ok(Self::Channel),
            other => Err(SummaryError::InvalidRequest(format!(
                "unknown summary type `{other}`"
            ))),
        }
    }
}

/// How much detail the summary should contain. Selects the prompt template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Brief,
    #[default]
    Standard,
    Detailed,
}

impl DetailLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
        }
    }
}

impl FromStr for DetailLevel {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brief" => Ok(Self::Brief),
            "standard" => Ok(Self::Standard),
            "detailed" => Ok(Self::Detailed),
            other => Err(SummaryError::InvalidRequest(format!(
                "unknown detail level `{other}`"
            ))),
        }
    }
}

/// A resolved conversation participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub display_name: String,
}

/// Input to [`crate::summarizer::SummarizationService::summarize`].
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub kind: SummaryKind,
    pub user_id: String,
    pub channel_id: Option<String>,
    pub root_id: Option<String>,
    /// Any message in a thread; the builder walks it to the root.
    pub reply_id: Option<String>,
    /// Range token such as `24h`, `7d`, `today`, `36h` or `2024-01-01 2024-01-07`.
    pub range: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub detail: DetailLevel,
    pub force_regenerate: bool,
}

impl SummaryRequest {
    fn empty(kind: SummaryKind, user_id: impl Into<String>) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            channel_id: None,
            root_id: None,
            reply_id: None,
            range: None,
            since: None,
            until: None,
            detail: DetailLevel::default(),
            force_regenerate: false,
        }
    }

    #[must_use]
    pub fn thread(user_id: impl Into<String>, root_id: impl Into<String>) -> Self {
        Self {
            root_id: Some(root_id.into()),
            ..Self::empty(SummaryKind::Thread, user_id)
        }
    }

    #[must_use]
    pub fn reply(user_id: impl Into<String>, reply_id: impl Into<String>) -> Self {
        Self {
            reply_id: Some(reply_id.into()),
            ..Self::empty(SummaryKind::Thread, user_id)
        }
    }

    #[must_use]
    pub fn channel(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: Some(channel_id.into()),
            ..Self::empty(SummaryKind::Channel, user_id)
        }
    }

    #[must_use]
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    #[must_use]
    pub const fn with_bounds(
        mut self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    #[must_use]
    pub const fn with_detail(mut self, detail: DetailLevel) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub const fn force_regenerate(mut self) -> Self {
        self.force_regenerate = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRange {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub label: String,
}

/// Presentation metadata for whoever renders the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryContext {
    pub type_label: String,
    pub message_limit: usize,
    pub timeframe: String,
}

/// A generated summary plus everything needed to display and cache it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub key: String,
    pub kind: SummaryKind,
    pub channel_id: String,
    pub channel_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub detail: DetailLevel,
    pub message_count: usize,
    pub participant_count: usize,
    pub participants: Vec<Participant>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub range: SummaryRange,
    pub context: SummaryContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub limit_reached: bool,
    pub conversation_hash: String,
    /// Set on the way out of the cache; always stored as `false`.
    #[serde(default)]
    pub served_from_cache: bool,
}

impl SummaryRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
