use crate::chat::ChannelMessage;

/// Which end of an over-long conversation to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepEnd {
    /// Keep the first messages; the start of a thread carries its context.
    Oldest,
    /// Keep the latest messages; in a channel they are what just happened.
    Newest,
}

/// Filters a list of messages, retaining only those written by people:
/// no soft-deleted messages and no system messages.
#[must_use]
pub fn filter_user_messages(messages: Vec<ChannelMessage>) -> Vec<ChannelMessage> {
    messages
        .into_iter()
        .filter(|msg| !msg.deleted && !msg.is_system)
        .collect()
}

/// Stable ascending sort by creation time.
pub fn sort_chronologically(messages: &mut [ChannelMessage]) {
    messages.sort_by_key(|m| m.created_at);
}

/// Trims `messages` (already sorted) to at most `limit` entries.
/// Returns whether anything was dropped. A zero limit means unlimited.
#[must_use]
pub fn apply_limit(
    mut messages: Vec<ChannelMessage>,
    limit: usize,
    keep: KeepEnd,
) -> (bool, Vec<ChannelMessage>) {
    if limit == 0 || messages.len() <= limit {
        return (false, messages);
    }

    match keep {
        KeepEnd::Oldest => messages.truncate(limit),
        KeepEnd::Newest => {
            messages.drain(..messages.len() - limit);
        }
    }
    (true, messages)
}
