mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use common::completion_body;
use recap::ai::{ChatMessage, CompletionClient, CompletionClientConfig, CompletionRequest, Role};
use recap::core::RequestContext;
use recap::errors::SummaryError;

fn client_for(server: &MockServer, max_retries: u32, base_delay: Duration) -> CompletionClient {
    CompletionClient::new(CompletionClientConfig {
        api_key: "sk-test".to_string(),
        model: "gpt-test".to_string(),
        base_url: format!("{}/v1", server.uri()),
        request_timeout: Duration::from_secs(5),
        requests_per_minute: 0,
        max_retries,
        retry_base_delay: base_delay,
    })
    .unwrap()
}

fn request() -> CompletionRequest {
    CompletionRequest::new(vec![
        ChatMessage::new(Role::System, "You summarize."),
        ChatMessage::new(Role::User, "Alice: ship it"),
    ])
}

async fn attempts(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

/// When each request reached the mock server.
#[derive(Clone, Default)]
struct Arrivals(Arc<Mutex<Vec<Instant>>>);

impl Arrivals {
    /// Records an arrival and returns how many there have been so far.
    fn record(&self) -> usize {
        let mut times = self.0.lock().unwrap();
        times.push(Instant::now());
        times.len()
    }

    fn gaps(&self) -> Vec<Duration> {
        self.0
            .lock()
            .unwrap()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }
}

/// Answers the first request with 429 and `retry_after`, then succeeds.
async fn rate_limited_once(server: &MockServer, retry_after: &'static str) -> Arrivals {
    let arrivals = Arrivals::default();
    let seen = arrivals.clone();
    Mock::given(method("POST"))
        .respond_with(move |_: &Request| {
            if seen.record() == 1 {
                ResponseTemplate::new(429).insert_header("retry-after", retry_after)
            } else {
                ResponseTemplate::new(200).set_body_json(completion_body("Recovered."))
            }
        })
        .mount(server)
        .await;
    arrivals
}

#[tokio::test]
async fn test_successful_completion_fills_default_model() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-test" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Shipped.")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3, Duration::from_millis(1));
    let response = client.complete(&RequestContext::new(), &request()).await?;

    assert_eq!(response.first_text(), Some("Shipped."));
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(49));
    Ok(())
}

#[tokio::test]
async fn test_server_errors_exhaust_exactly_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client_for(&server, 3, Duration::from_millis(1));
    let err = client
        .complete(&RequestContext::new(), &request())
        .await
        .unwrap_err();

    match err {
        SummaryError::UpstreamTransient { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected UpstreamTransient, got {other:?}"),
    }
    assert_eq!(attempts(&server).await, 3);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 3, Duration::from_millis(1));
    let err = client
        .complete(&RequestContext::new(), &request())
        .await
        .unwrap_err();

    match err {
        SummaryError::UpstreamAuth(message) => assert!(message.contains("Incorrect API key")),
        other => panic!("expected UpstreamAuth, got {other:?}"),
    }
    assert_eq!(attempts(&server).await, 1);
}

#[tokio::test]
async fn test_bad_request_is_rejected_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("context length exceeded"))
        .mount(&server)
        .await;

    let client = client_for(&server, 3, Duration::from_millis(1));
    let err = client
        .complete(&RequestContext::new(), &request())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SummaryError::UpstreamRejected { status: 400, .. }
    ));
    assert_eq!(attempts(&server).await, 1);
}

#[tokio::test]
async fn test_rate_limited_then_success() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Recovered.")))
        .mount(&server)
        .await;

    let client = client_for(&server, 3, Duration::from_millis(1));
    let response = client.complete(&RequestContext::new(), &request()).await?;

    assert_eq!(response.first_text(), Some("Recovered."));
    assert_eq!(attempts(&server).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_success_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, 3, Duration::from_millis(1));
    let err = client
        .complete(&RequestContext::new(), &request())
        .await
        .unwrap_err();

    assert!(matches!(err, SummaryError::InvalidResponse(_)));
    assert_eq!(attempts(&server).await, 1);
}

#[tokio::test]
async fn test_empty_request_never_reaches_network() {
    let server = MockServer::start().await;
    let client = client_for(&server, 3, Duration::from_millis(1));

    let err = client
        .complete(&RequestContext::new(), &CompletionRequest::new(Vec::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, SummaryError::InvalidRequest(_)));
    assert_eq!(attempts(&server).await, 0);
}

#[tokio::test]
async fn test_deadline_interrupts_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server, 3, Duration::from_secs(30));
    let ctx = RequestContext::new().with_timeout(Duration::from_millis(300));

    let started = std::time::Instant::now();
    let err = client.complete(&ctx, &request()).await.unwrap_err();

    assert!(matches!(err, SummaryError::Cancelled(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(attempts(&server).await, 1);
}

#[tokio::test]
async fn test_cancelled_rate_limit_wait() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .mount(&server)
        .await;

    let client = CompletionClient::new(CompletionClientConfig {
        requests_per_minute: 1,
        ..CompletionClientConfig {
            api_key: "sk-test".to_string(),
            model: "gpt-test".to_string(),
            base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
            requests_per_minute: 0,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1),
        }
    })?;

    client.complete(&RequestContext::new(), &request()).await?;

    let ctx = RequestContext::new().with_timeout(Duration::from_millis(100));
    let err = client.complete(&ctx, &request()).await.unwrap_err();

    assert!(matches!(err, SummaryError::RateLimitWaitCancelled));
    assert_eq!(attempts(&server).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_retry_after_hint_stretches_backoff() -> Result<()> {
    let server = MockServer::start().await;
    let arrivals = rate_limited_once(&server, "1").await;

    let client = client_for(&server, 3, Duration::from_millis(1));
    let response = client.complete(&RequestContext::new(), &request()).await?;

    assert_eq!(response.first_text(), Some("Recovered."));
    let gaps = arrivals.gaps();
    assert_eq!(gaps.len(), 1);
    assert!(gaps[0] >= Duration::from_secs(1), "waited {:?}", gaps[0]);
    assert!(gaps[0] < Duration::from_secs(5), "waited {:?}", gaps[0]);
    Ok(())
}

#[tokio::test]
async fn test_short_retry_after_keeps_scheduled_backoff() -> Result<()> {
    let server = MockServer::start().await;
    let arrivals = rate_limited_once(&server, "0").await;

    let client = client_for(&server, 3, Duration::from_millis(200));
    client.complete(&RequestContext::new(), &request()).await?;

    let gaps = arrivals.gaps();
    assert_eq!(gaps.len(), 1);
    // First retry waits twice the base delay whatever the hint says.
    assert!(gaps[0] >= Duration::from_millis(400), "waited {:?}", gaps[0]);
    Ok(())
}

#[tokio::test]
async fn test_backoff_gaps_never_shrink() {
    let server = MockServer::start().await;
    let arrivals = Arrivals::default();
    let seen = arrivals.clone();
    Mock::given(method("POST"))
        .respond_with(move |_: &Request| {
            seen.record();
            ResponseTemplate::new(500).set_body_string("boom")
        })
        .mount(&server)
        .await;

    let client = client_for(&server, 4, Duration::from_millis(50));
    let err = client
        .complete(&RequestContext::new(), &request())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SummaryError::UpstreamTransient { attempts: 4, .. }
    ));

    let gaps = arrivals.gaps();
    assert_eq!(gaps.len(), 3);
    for (gap, floor) in gaps.iter().zip([100, 200, 400]) {
        assert!(*gap >= Duration::from_millis(floor), "gaps {gaps:?}");
    }
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]), "gaps {gaps:?}");
}
