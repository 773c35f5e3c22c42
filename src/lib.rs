/// Recap - conversation summaries for team chat, generated with an LLM.
///
/// This crate turns a thread or a time window of a channel into a bounded
/// transcript, asks a chat completions endpoint to summarize it, and caches the
/// result keyed by a fingerprint of the messages it was built from.
///
/// # Architecture
///
/// The system uses:
/// - reqwest for the completions endpoint, with a token-bucket rate limiter and retry/backoff
/// - Pluggable message store, identity, permission and key-value collaborators
/// - sha2 fingerprints so edited conversations never hit a stale cache entry
/// - Tokio for the async runtime and cancellation
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use recap::ai::{CompletionClient, CompletionClientConfig};
/// use recap::chat::{IdentityResolver, MemoryKvStore, MessageStore, PermissionChecker};
/// use recap::core::{AppConfig, LiveConfig, RequestContext, SystemClock};
/// use recap::core::models::SummaryRequest;
/// use recap::summarizer::{SummarizationService, SummaryCache};
///
/// async fn run(
///     messages: Arc<dyn MessageStore>,
///     identities: Arc<dyn IdentityResolver>,
///     permissions: Arc<dyn PermissionChecker>,
/// ) -> Result<(), Box<dyn std::error::Error>> {
///     recap::setup_logging();
///
///     let config = AppConfig::from_env()?;
///     config.validate()?;
///     let client = CompletionClientConfig::from_app_config(&config)
///         .map(CompletionClient::new)
///         .transpose()?;
///     let cache = SummaryCache::new(Arc::new(MemoryKvStore::new()), Arc::new(SystemClock));
///
///     let mut service = SummarizationService::new(
///         messages,
///         identities,
///         permissions,
///         Arc::new(LiveConfig::new(config)),
///     )
///     .with_cache(cache);
///     if let Some(client) = client {
///         service = service.with_client(Arc::new(client));
///     }
///
///     let ctx = RequestContext::new().with_timeout(Duration::from_secs(60));
///     let record = service
///         .summarize(&ctx, SummaryRequest::channel("U123", "C123").with_range("7d"))
///         .await?;
///     println!("{}\n{}", record.title, record.summary);
///     Ok(())
/// }
/// ```
// Module declarations
pub mod ai;
pub mod chat;
pub mod core;
pub mod errors;
pub mod summarizer;
pub mod utils;

/// Configure structured logging with JSON output.
///
/// Verbosity follows `RUST_LOG` and defaults to `info`. Calling this more than
/// once is harmless; only the first call installs a subscriber.
///
/// # Example
///
/// ```
/// recap::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
