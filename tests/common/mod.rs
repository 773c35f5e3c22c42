#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use recap::chat::{
    ChannelMessage, IdentityResolver, KvStore, MessageStore, PermissionChecker, UserProfile,
};
use recap::errors::SummaryError;

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

pub fn msg(id: &str, author: &str, text: &str, created_at: DateTime<Utc>) -> ChannelMessage {
    ChannelMessage {
        id: id.to_string(),
        author_id: author.to_string(),
        channel_id: "C1".to_string(),
        root_id: None,
        text: text.to_string(),
        created_at,
        updated_at: created_at,
        deleted: false,
        is_system: false,
        attachment_count: 0,
    }
}

pub fn reply(id: &str, root: &str, author: &str, text: &str, created_at: DateTime<Utc>) -> ChannelMessage {
    ChannelMessage {
        root_id: Some(root.to_string()),
        ..msg(id, author, text, created_at)
    }
}

pub fn profile(id: &str, username: &str, display_name: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        username: username.to_string(),
        display_name: display_name.to_string(),
    }
}

/// In-memory chat platform: messages, users and channel membership.
#[derive(Default)]
pub struct FakeChat {
    messages: Mutex<Vec<ChannelMessage>>,
    users: HashMap<String, UserProfile>,
    members: HashSet<(String, String)>,
    channel_names: HashMap<String, String>,
    pub fail_batch_resolve: bool,
    pub fail_membership: bool,
    pub fetches: AtomicUsize,
    pub resolve_calls: AtomicUsize,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alice and Bob, both members of `C1` which is called `general`.
    pub fn with_team() -> Self {
        Self::new()
            .user(profile("U1", "alice", "Alice"))
            .user(profile("U2", "bob", "Bob"))
            .member("C1", "U1")
            .member("C1", "U2")
            .channel_name("C1", "general")
    }

    pub fn user(mut self, user: UserProfile) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn member(mut self, channel: &str, user: &str) -> Self {
        self.members.insert((channel.to_string(), user.to_string()));
        self
    }

    pub fn channel_name(mut self, channel: &str, name: &str) -> Self {
        self.channel_names.insert(channel.to_string(), name.to_string());
        self
    }

    pub fn with_messages(self, messages: Vec<ChannelMessage>) -> Self {
        *self.messages.lock().unwrap() = messages;
        self
    }

    pub fn push(&self, message: ChannelMessage) {
        self.messages.lock().unwrap().push(message);
    }

    /// Replaces the text of `id` and bumps its edit time by a second.
    pub fn edit(&self, id: &str, text: &str) {
        let mut messages = self.messages.lock().unwrap();
        if let Some(m) = messages.iter_mut().find(|m| m.id == id) {
            m.text = text.to_string();
            m.updated_at += chrono::TimeDelta::seconds(1);
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageStore for FakeChat {
    async fn thread(&self, root_id: &str) -> Result<Vec<ChannelMessage>, SummaryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.thread_root() == root_id)
            .cloned()
            .collect())
    }

    async fn messages_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChannelMessage>, SummaryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_id == channel_id && m.created_at >= since)
            .cloned()
            .collect())
    }

    async fn message(&self, message_id: &str) -> Result<ChannelMessage, SummaryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| SummaryError::Store(format!("message {message_id} not found")))
    }

    async fn channel_display_name(&self, channel_id: &str) -> Result<String, SummaryError> {
        self.channel_names
            .get(channel_id)
            .cloned()
            .ok_or_else(|| SummaryError::Store(format!("channel {channel_id} not found")))
    }
}

#[async_trait]
impl IdentityResolver for FakeChat {
    async fn resolve_many(&self, user_ids: &[String]) -> Result<Vec<UserProfile>, SummaryError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch_resolve {
            return Err(SummaryError::Store("batch lookup unavailable".to_string()));
        }
        Ok(user_ids
            .iter()
            .filter_map(|id| self.users.get(id).cloned())
            .collect())
    }

    async fn resolve(&self, user_id: &str) -> Result<UserProfile, SummaryError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| SummaryError::Store(format!("user {user_id} not found")))
    }
}

#[async_trait]
impl PermissionChecker for FakeChat {
    async fn is_member(&self, channel_id: &str, user_id: &str) -> Result<bool, SummaryError> {
        if self.fail_membership {
            return Err(SummaryError::Store("membership lookup failed".to_string()));
        }
        Ok(self
            .members
            .contains(&(channel_id.to_string(), user_id.to_string())))
    }
}

/// A store whose writes always fail and whose reads always miss.
#[derive(Default)]
pub struct BrokenKvStore {
    pub writes: AtomicUsize,
}

#[async_trait]
impl KvStore for BrokenKvStore {
    async fn get(&self, _namespace: &str, _key: &str) -> Result<Option<Vec<u8>>, SummaryError> {
        Err(SummaryError::Store("connection refused".to_string()))
    }

    async fn set_with_expiry(
        &self,
        _namespace: &str,
        _key: &str,
        _value: Vec<u8>,
        _ttl: Duration,
    ) -> Result<(), SummaryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(SummaryError::Store("connection refused".to_string()))
    }

    async fn delete(&self, _namespace: &str, _key: &str) -> Result<(), SummaryError> {
        Ok(())
    }
}

/// Body of a successful chat completions response.
pub fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": { "role": "assistant", "content": text }
        }],
        "usage": { "prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49 }
    })
}
