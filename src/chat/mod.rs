//! Chat platform collaborators: message history, identities, permissions, storage

pub mod kv;
pub mod store;

pub use kv::{KvStore, MemoryKvStore};
pub use store::{ChannelMessage, IdentityResolver, MessageStore, PermissionChecker, UserProfile};
