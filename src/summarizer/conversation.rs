//! Turns raw message history into a bounded, rendered transcript.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::range::TimeWindow;
use crate::chat::{ChannelMessage, IdentityResolver, MessageStore, UserProfile};
use crate::core::models::Participant;
use crate::errors::SummaryError;
use crate::utils::filters::{KeepEnd, apply_limit, filter_user_messages, sort_chronologically};
use crate::utils::hash::hash_messages;
use crate::utils::text::sanitize_message_text;

const TRANSCRIPT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// What to build a conversation from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationScope {
    Thread { root_id: String, channel_id: String },
    Channel { channel_id: String, window: TimeWindow },
}

impl ConversationScope {
    #[must_use]
    pub fn channel_id(&self) -> &str {
        match self {
            Self::Thread { channel_id, .. } | Self::Channel { channel_id, .. } => channel_id,
        }
    }
}

/// Everything downstream stages need to know about one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub channel_id: String,
    pub channel_name: String,
    pub root_id: Option<String>,
    pub title: String,
    pub context_label: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub range_label: String,
    pub participants: Vec<Participant>,
    pub transcript: String,
    /// Messages in the trimmed set, including any that rendered to nothing.
    pub message_count: usize,
    pub message_limit: usize,
    pub limit_reached: bool,
    /// Fingerprint of the trimmed set's ids and edit times.
    pub hash: String,
}

impl ConversationSnapshot {
    #[must_use]
    pub fn participant_names(&self) -> Vec<&str> {
        self.participants
            .iter()
            .map(|p| p.display_name.as_str())
            .collect()
    }
}

pub struct ConversationBuilder<'a> {
    store: &'a dyn MessageStore,
    identities: &'a dyn IdentityResolver,
}

impl<'a> ConversationBuilder<'a> {
    #[must_use]
    pub fn new(store: &'a dyn MessageStore, identities: &'a dyn IdentityResolver) -> Self {
        Self { store, identities }
    }

    /// Resolves the thread a request points at, walking from a reply to its
    /// root when needed. Returns `(root_id, channel_id)`.
    ///
    /// # Errors
    ///
    /// [`SummaryError::InvalidRequest`] when neither id is given; a blank id
    /// counts as missing. Store errors are returned unchanged.
    pub async fn resolve_thread(
        &self,
        root_id: Option<&str>,
        reply_id: Option<&str>,
    ) -> Result<(String, String), SummaryError> {
        fn given(id: Option<&str>) -> Option<&str> {
            id.map(str::trim).filter(|id| !id.is_empty())
        }
        let start = given(root_id).or_else(|| given(reply_id)).ok_or_else(|| {
            SummaryError::InvalidRequest("root_id or reply_id required".to_string())
        })?;

        let message = self.store.message(start).await?;
        let root = message.thread_root().to_string();
        if root != message.id {
            debug!("Message {} belongs to thread {}", message.id, root);
        }
        Ok((root, message.channel_id))
    }

    /// # Errors
    ///
    /// [`SummaryError::EmptyConversation`] when nothing survives filtering;
    /// store errors are returned unchanged.
    pub async fn build(
        &self,
        scope: &ConversationScope,
        limit: usize,
    ) -> Result<ConversationSnapshot, SummaryError> {
        match scope {
            ConversationScope::Thread {
                root_id,
                channel_id,
            } => self.build_thread(root_id, channel_id, limit).await,
            ConversationScope::Channel { channel_id, window } => {
                self.build_channel(channel_id, window, limit).await
            }
        }
    }

    async fn build_thread(
        &self,
        root_id: &str,
        channel_id: &str,
        limit: usize,
    ) -> Result<ConversationSnapshot, SummaryError> {
        let mut messages = filter_user_messages(self.store.thread(root_id).await?);
        if messages.is_empty() {
            return Err(SummaryError::EmptyConversation);
        }

        sort_chronologically(&mut messages);
        let (limit_reached, trimmed) = apply_limit(messages, limit, KeepEnd::Oldest);

        let since = trimmed.first().map(|m| m.created_at).unwrap_or_default();
        let until = trimmed.last().map(|m| m.created_at).unwrap_or_default();
        let range_label = format!(
            "{} – {}",
            since.format("%d %b %y %H:%M UTC"),
            until.format("%d %b %y %H:%M UTC")
        );

        let channel_name = self.channel_name(channel_id).await;
        let participants = self.collect_participants(&trimmed).await;

        Ok(self.snapshot(
            trimmed,
            participants,
            SnapshotHeader {
                channel_id: channel_id.to_string(),
                title: "Thread Summary".to_string(),
                channel_name,
                root_id: Some(root_id.to_string()),
                context_label: "Thread".to_string(),
                since,
                until,
                range_label,
                limit,
                limit_reached,
            },
        ))
    }

    async fn build_channel(
        &self,
        channel_id: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<ConversationSnapshot, SummaryError> {
        let fetched = self.store.messages_since(channel_id, window.since).await?;
        let mut messages: Vec<ChannelMessage> = filter_user_messages(fetched)
            .into_iter()
            .filter(|m| window.contains(m.created_at))
            .collect();
        if messages.is_empty() {
            return Err(SummaryError::EmptyConversation);
        }

        sort_chronologically(&mut messages);
        let (limit_reached, trimmed) = apply_limit(messages, limit, KeepEnd::Newest);

        let channel_name = self.channel_name(channel_id).await;
        let participants = self.collect_participants(&trimmed).await;

        Ok(self.snapshot(
            trimmed,
            participants,
            SnapshotHeader {
                channel_id: channel_id.to_string(),
                title: format!("Channel Summary • #{channel_name}"),
                channel_name,
                root_id: None,
                context_label: "Channel".to_string(),
                since: window.since,
                until: window.until,
                range_label: window.label.clone(),
                limit,
                limit_reached,
            },
        ))
    }

    #[allow(clippy::unused_self)]
    fn snapshot(
        &self,
        trimmed: Vec<ChannelMessage>,
        participants: Vec<Participant>,
        header: SnapshotHeader,
    ) -> ConversationSnapshot {
        let transcript = render_transcript(&trimmed, &participants);
        let hash = hash_messages(&trimmed);

        info!(
            "Built {} conversation for {} with {} messages from {} participants (limit reached: {})",
            header.context_label,
            header.channel_id,
            trimmed.len(),
            participants.len(),
            header.limit_reached
        );

        ConversationSnapshot {
            channel_id: header.channel_id,
            channel_name: header.channel_name,
            root_id: header.root_id,
            title: header.title,
            context_label: header.context_label,
            since: header.since,
            until: header.until,
            range_label: header.range_label,
            participants,
            transcript,
            message_count: trimmed.len(),
            message_limit: header.limit,
            limit_reached: header.limit_reached,
            hash,
        }
    }

    async fn channel_name(&self, channel_id: &str) -> String {
        match self.store.channel_display_name(channel_id).await {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => channel_id.to_string(),
            Err(e) => {
                warn!("Failed to resolve channel name for {}: {}", channel_id, e);
                channel_id.to_string()
            }
        }
    }

    /// Resolves every distinct author. Resolution failures fall back to the
    /// raw id and never abort the build.
    async fn collect_participants(&self, messages: &[ChannelMessage]) -> Vec<Participant> {
        let ids: Vec<String> = messages
            .iter()
            .map(|m| m.author_id.clone())
            .filter(|id| !id.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }

        let mut profiles: HashMap<String, UserProfile> = match self.identities.resolve_many(&ids).await
        {
            Ok(found) => found.into_iter().map(|p| (p.id.clone(), p)).collect(),
            Err(e) => {
                warn!("Batch identity resolution failed, resolving individually: {}", e);
                HashMap::new()
            }
        };

        let missing: Vec<&String> = ids.iter().filter(|id| !profiles.contains_key(*id)).collect();
        if !missing.is_empty() {
            let identities = self.identities;
            let lookups = missing
                .iter()
                .map(|id| async move { ((*id).clone(), identities.resolve(id).await) });
            for (id, result) in join_all(lookups).await {
                match result {
                    Ok(profile) => {
                        profiles.insert(id, profile);
                    }
                    Err(e) => warn!("Failed to resolve user {}: {}", id, e),
                }
            }
        }

        let mut participants: Vec<Participant> = ids
            .into_iter()
            .map(|id| match profiles.remove(&id) {
                Some(profile) => {
                    let display_name = [profile.display_name.trim(), profile.username.trim()]
                        .into_iter()
                        .find(|n| !n.is_empty())
                        .map_or_else(|| id.clone(), str::to_string);
                    Participant {
                        username: Some(profile.username).filter(|u| !u.is_empty()),
                        display_name,
                        id,
                    }
                }
                None => Participant {
                    display_name: id.clone(),
                    username: None,
                    id,
                },
            })
            .collect();

        participants.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        participants
    }
}

struct SnapshotHeader {
    channel_id: String,
    channel_name: String,
    root_id: Option<String>,
    title: String,
    context_label: String,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    range_label: String,
    limit: usize,
    limit_reached: bool,
}

/// One line per message: `[YYYY-MM-DD HH:MM] author: text`.
#[must_use]
pub fn render_transcript(messages: &[ChannelMessage], participants: &[Participant]) -> String {
    let names: HashMap<&str, &str> = participants
        .iter()
        .map(|p| (p.id.as_str(), p.display_name.as_str()))
        .collect();

    messages
        .iter()
        .filter_map(|msg| {
            let mut text = sanitize_message_text(&msg.text);
            if text.is_empty() {
                if msg.attachment_count == 0 {
                    return None;
                }
                text = format!("[Attached {} file(s)]", msg.attachment_count);
            }
            let author = names
                .get(msg.author_id.as_str())
                .copied()
                .filter(|n| !n.is_empty())
                .unwrap_or("Unknown");
            Some(format!(
                "[{}] {}: {}",
                msg.created_at.format(TRANSCRIPT_TIME_FORMAT),
                author,
                text
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
