//! The summarization state machine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use super::cache::SummaryCache;
use super::conversation::{ConversationBuilder, ConversationScope, ConversationSnapshot};
use super::range::resolve_window;
use crate::ai::client::{CompletionClient, estimate_tokens};
use crate::ai::prompt_builder::summary_template;
use crate::ai::types::{CompletionRequest, TokenUsage};
use crate::chat::{IdentityResolver, MessageStore, PermissionChecker};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{AppConfig, ConfigProvider};
use crate::core::context::RequestContext;
use crate::core::models::{
    SummaryContext, SummaryKind, SummaryRange, SummaryRecord, SummaryRequest,
};
use crate::errors::SummaryError;
use crate::utils::hash::build_cache_key;

/// Where a request is in its single pass through the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    BuildingConversation,
    CheckingCache,
    Rendering,
    Completing,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::BuildingConversation => "building_conversation",
            Self::CheckingCache => "checking_cache",
            Self::Rendering => "rendering",
            Self::Completing => "completing",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Validated target of a request, produced before any conversation is fetched.
struct Target {
    scope: ConversationScope,
    /// Thread root or window cache token; the part of the key that names what was summarized.
    subject: String,
}

/// Produces summaries of threads and channel windows, caching them by
/// conversation fingerprint.
///
/// One instance serves any number of concurrent requests. Each call reads a
/// fresh configuration snapshot and uses it for its whole run.
pub struct SummarizationService {
    messages: Arc<dyn MessageStore>,
    identities: Arc<dyn IdentityResolver>,
    permissions: Arc<dyn PermissionChecker>,
    config: Arc<dyn ConfigProvider>,
    client: Option<Arc<CompletionClient>>,
    cache: Option<SummaryCache>,
    clock: Arc<dyn Clock>,
}

impl SummarizationService {
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageStore>,
        identities: Arc<dyn IdentityResolver>,
        permissions: Arc<dyn PermissionChecker>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            messages,
            identities,
            permissions,
            config,
            client: None,
            cache: None,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: Arc<CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: SummaryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one request through validation, conversation build, cache lookup
    /// and, on a miss, completion and persistence.
    ///
    /// The whole run is bounded by the earlier of the caller's deadline and the
    /// configured orchestration timeout.
    ///
    /// # Errors
    ///
    /// Any [`SummaryError`] except [`SummaryError::CacheWriteFailed`], which is
    /// logged and swallowed.
    pub async fn summarize(
        &self,
        ctx: &RequestContext,
        request: SummaryRequest,
    ) -> Result<SummaryRecord, SummaryError> {
        let config = self.config.snapshot();
        let ctx = if config.orchestration_timeout().is_zero() {
            ctx.clone()
        } else {
            ctx.with_timeout(config.orchestration_timeout())
        };

        info!(
            correlation_id = ctx.correlation_id(),
            "Summary requested: kind={} user={} detail={} force={}",
            request.kind,
            request.user_id,
            request.detail.as_str(),
            request.force_regenerate
        );

        let result = ctx
            .run("summary orchestration", self.run(&ctx, &config, &request))
            .await;

        match &result {
            Ok(record) => info!(
                correlation_id = ctx.correlation_id(),
                "Summary {} ready ({} messages, cached: {})",
                record.key,
                record.message_count,
                record.served_from_cache
            ),
            Err(e) if e.is_transient() => warn!(
                correlation_id = ctx.correlation_id(),
                "Summary request failed: {}", e
            ),
            Err(e) => error!(
                correlation_id = ctx.correlation_id(),
                "Summary request failed: {}", e
            ),
        }
        result
    }

    /// Drops a cached summary by key.
    ///
    /// # Errors
    ///
    /// [`SummaryError::ClientUnavailable`] when no cache is configured, otherwise
    /// whatever the store returns.
    pub async fn invalidate(&self, ctx: &RequestContext, key: &str) -> Result<(), SummaryError> {
        let cache = self.cache.as_ref().ok_or(SummaryError::ClientUnavailable)?;
        ctx.run("cache invalidation", cache.invalidate(key)).await?;
        info!(
            correlation_id = ctx.correlation_id(),
            "Invalidated cached summary {}", key
        );
        Ok(())
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        config: &AppConfig,
        request: &SummaryRequest,
    ) -> Result<SummaryRecord, SummaryError> {
        enter(ctx, Stage::Validating);
        let (client, cache) = self.collaborators(config)?;
        let target = self.validate(request).await?;

        enter(ctx, Stage::BuildingConversation);
        let builder = ConversationBuilder::new(self.messages.as_ref(), self.identities.as_ref());
        let snapshot = builder.build(&target.scope, config.message_limit()).await?;

        enter(ctx, Stage::CheckingCache);
        let key = build_cache_key(&[
            request.kind.as_str(),
            &snapshot.channel_id,
            &target.subject,
            request.detail.as_str(),
            &snapshot.hash,
        ]);
        if request.force_regenerate {
            debug!(
                correlation_id = ctx.correlation_id(),
                "Forced regeneration, skipping cache read for {}", key
            );
        } else {
            match cache.get(&key).await {
                Ok(Some(record)) => {
                    info!(
                        correlation_id = ctx.correlation_id(),
                        "Cache hit for {}", key
                    );
                    return Ok(record);
                }
                Ok(None) => debug!(
                    correlation_id = ctx.correlation_id(),
                    "Cache miss for {}", key
                ),
                Err(e) => warn!(
                    correlation_id = ctx.correlation_id(),
                    "Cache read for {} failed, treating as miss: {}", key, e
                ),
            }
        }

        enter(ctx, Stage::Rendering);
        let completion = render_request(config, request, &snapshot);

        #[cfg(feature = "debug-logs")]
        info!("Using completion prompt:\n{:?}", completion.messages);

        #[cfg(not(feature = "debug-logs"))]
        info!(
            "Using completion prompt: [... content masked, enable debug-logs feature to view full prompt ...]"
        );

        let estimated_input_tokens = completion
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum::<usize>();
        info!("Estimated input tokens: {}", estimated_input_tokens);

        enter(ctx, Stage::Completing);
        let response = client.complete(ctx, &completion).await?;
        let summary = response
            .first_text()
            .ok_or_else(|| {
                SummaryError::InvalidResponse("completion contained no text".to_string())
            })?
            .to_string();

        enter(ctx, Stage::Persisting);
        let generated_at = self.clock.now();
        let record = build_record(
            key,
            request,
            snapshot,
            summary,
            response.usage,
            generated_at,
            expiry(generated_at, config.cache_ttl()),
        );
        if let Err(e) = cache.put(&record, config.cache_ttl()).await {
            warn!(
                correlation_id = ctx.correlation_id(),
                "Returning uncached summary: {}", e
            );
        }

        Ok(record)
    }

    /// Both the completion client and the cache must be wired before anything
    /// else is checked.
    fn collaborators(
        &self,
        config: &AppConfig,
    ) -> Result<(&CompletionClient, &SummaryCache), SummaryError> {
        let (Some(client), Some(cache)) = (self.client.as_deref(), self.cache.as_ref()) else {
            return Err(SummaryError::ClientUnavailable);
        };
        if !config.enable_summarization {
            return Err(SummaryError::Disabled);
        }
        Ok((client, cache))
    }

    /// Checks identifiers and the channel range before touching the network,
    /// then resolves the thread root and checks membership.
    async fn validate(&self, request: &SummaryRequest) -> Result<Target, SummaryError> {
        if request.user_id.trim().is_empty() {
            return Err(SummaryError::InvalidRequest("user_id is required".to_string()));
        }

        let target = match request.kind {
            SummaryKind::Channel => {
                let channel_id = required(request.channel_id.as_deref(), "channel_id")?;
                let window = resolve_window(
                    request.range.as_deref(),
                    request.since,
                    request.until,
                    self.clock.now(),
                )?;
                Target {
                    subject: window.cache_token.clone(),
                    scope: ConversationScope::Channel {
                        channel_id: channel_id.to_string(),
                        window,
                    },
                }
            }
            SummaryKind::Thread => {
                if request.root_id.is_none() && request.reply_id.is_none() {
                    return Err(SummaryError::InvalidRequest(
                        "root_id or reply_id is required for thread summaries".to_string(),
                    ));
                }
                let builder =
                    ConversationBuilder::new(self.messages.as_ref(), self.identities.as_ref());
                let (root_id, channel_id) = builder
                    .resolve_thread(request.root_id.as_deref(), request.reply_id.as_deref())
                    .await?;
                if let Some(expected) = request.channel_id.as_deref()
                    && !expected.trim().is_empty()
                    && expected != channel_id
                {
                    return Err(SummaryError::InvalidRequest(format!(
                        "thread {root_id} is not in channel {expected}"
                    )));
                }
                Target {
                    subject: root_id.clone(),
                    scope: ConversationScope::Thread {
                        root_id,
                        channel_id,
                    },
                }
            }
        };

        let channel_id = target.scope.channel_id().to_string();
        match self.permissions.is_member(&channel_id, &request.user_id).await {
            Ok(true) => Ok(target),
            Ok(false) => Err(SummaryError::Unauthorized),
            Err(e) => {
                warn!(
                    "Membership check for {} in {} failed: {}",
                    request.user_id, channel_id, e
                );
                Err(SummaryError::Unauthorized)
            }
        }
    }
}

fn enter(ctx: &RequestContext, stage: Stage) {
    debug!(correlation_id = ctx.correlation_id(), "Entering stage {}", stage);
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, SummaryError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SummaryError::InvalidRequest(format!("{name} is required")))
}

fn render_request(
    config: &AppConfig,
    request: &SummaryRequest,
    snapshot: &ConversationSnapshot,
) -> CompletionRequest {
    let context_type = match request.kind {
        SummaryKind::Thread => "thread",
        SummaryKind::Channel => "channel discussion",
    };
    let vars: HashMap<&str, String> = HashMap::from([
        ("channel", format!("#{}", snapshot.channel_name)),
        ("timeframe", snapshot.range_label.clone()),
        ("context_type", context_type.to_string()),
        ("message_count", snapshot.message_count.to_string()),
        ("participants", snapshot.participant_names().join(", ")),
        ("messages", snapshot.transcript.clone()),
    ]);

    let template = summary_template(request.detail);
    debug!("Rendering template {}", template.name);

    CompletionRequest {
        model: config.model().to_string(),
        messages: template.render(&vars),
        temperature: Some(config.temperature),
        max_tokens: config.max_output_tokens,
        user: Some(request.user_id.clone()),
    }
}

fn expiry(generated_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| generated_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn build_record(
    key: String,
    request: &SummaryRequest,
    snapshot: ConversationSnapshot,
    summary: String,
    usage: Option<TokenUsage>,
    generated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> SummaryRecord {
    SummaryRecord {
        key,
        kind: request.kind,
        channel_id: snapshot.channel_id,
        channel_name: snapshot.channel_name,
        root_id: snapshot.root_id,
        title: snapshot.title,
        summary,
        detail: request.detail,
        message_count: snapshot.message_count,
        participant_count: snapshot.participants.len(),
        participants: snapshot.participants,
        generated_at,
        expires_at,
        range: SummaryRange {
            since: snapshot.since,
            until: snapshot.until,
            label: snapshot.range_label.clone(),
        },
        context: SummaryContext {
            type_label: snapshot.context_label,
            message_limit: snapshot.message_limit,
            timeframe: snapshot.range_label,
        },
        usage,
        limit_reached: snapshot.limit_reached,
        conversation_hash: snapshot.hash,
        served_from_cache: false,
    }
}
