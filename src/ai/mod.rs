//! All AI/LLM functionality

pub mod client;
pub mod prompt_builder;
pub mod rate_limit;
pub mod types;

// Re-export main types for convenience
pub use client::{CompletionClient, CompletionClientConfig, estimate_tokens};
pub use prompt_builder::{PromptTemplate, summary_template};
pub use rate_limit::TokenBucket;
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, Role, TokenUsage};
