//! Summary orchestration: windows, conversations, caching and the service that ties them together

pub mod cache;
pub mod conversation;
pub mod range;
pub mod service;

pub use cache::SummaryCache;
pub use conversation::{ConversationBuilder, ConversationScope, ConversationSnapshot};
pub use range::{RangeSpec, TimeWindow, resolve_window};
pub use service::{Stage, SummarizationService};
