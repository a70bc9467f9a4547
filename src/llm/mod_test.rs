use super::*;
use crate::llm::payload::ChatPayload;
use crate::llm::types::{Choice, ChoiceMessage, Usage};
use crate::telemetry::{TelemetryError, TelemetrySink};
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

// =========================================================================
// MockTransport
// =========================================================================

struct MockTransport {
    responses: Mutex<Vec<Result<ChatCompletion, GenerationError>>>,
    calls: Mutex<Vec<(ChatPayload, Instant)>>,
}

impl MockTransport {
    fn new(responses: Vec<Result<ChatCompletion, GenerationError>>) -> Arc<Self> {
        Arc::new(Self { responses: Mutex::new(responses), calls: Mutex::new(Vec::new()) })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ChatTransport for MockTransport {
    async fn send(&self, payload: &ChatPayload, _timeout: Duration) -> Result<ChatCompletion, GenerationError> {
        self.calls.lock().unwrap().push((payload.clone(), Instant::now()));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(completion_with("done", "stop"))
        } else {
            responses.remove(0)
        }
    }
}

/// Fails every call with the same error.
struct AlwaysFailing {
    error: GenerationError,
    calls: Mutex<Vec<Instant>>,
}

#[async_trait::async_trait]
impl ChatTransport for AlwaysFailing {
    async fn send(&self, _payload: &ChatPayload, _timeout: Duration) -> Result<ChatCompletion, GenerationError> {
        self.calls.lock().unwrap().push(Instant::now());
        Err(self.error.clone())
    }
}

// =========================================================================
// Sinks
// =========================================================================

struct ChannelSink {
    tx: mpsc::UnboundedSender<TelemetryRecord>,
}

#[async_trait::async_trait]
impl TelemetrySink for ChannelSink {
    async fn record(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        self.tx
            .send(record.clone())
            .map_err(|e| TelemetryError::Sink(e.to_string()))
    }
}

struct BrokenSink;

#[async_trait::async_trait]
impl TelemetrySink for BrokenSink {
    async fn record(&self, _record: &TelemetryRecord) -> Result<(), TelemetryError> {
        Err(TelemetryError::Sink("connection refused".into()))
    }
}

struct HangingSink;

#[async_trait::async_trait]
impl TelemetrySink for HangingSink {
    async fn record(&self, _record: &TelemetryRecord) -> Result<(), TelemetryError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn completion_with(content: &str, finish_reason: &str) -> ChatCompletion {
    ChatCompletion {
        id: "gen-1".into(),
        model: "openai/gpt-4o-mini".into(),
        choices: vec![Choice {
            message: ChoiceMessage { role: "assistant".into(), content: Some(content.into()) },
            finish_reason: Some(finish_reason.into()),
        }],
        usage: Some(Usage { prompt_tokens: 20, completion_tokens: 10, total_tokens: 30 }),
    }
}

fn ab_schema() -> ResponseSchema {
    ResponseSchema::new(
        "pair",
        json!({
            "type": "object",
            "properties": { "a": { "type": "string" }, "b": { "type": "number" } },
            "required": ["a", "b"]
        }),
    )
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy { attempts: 2, base_delay: Duration::from_millis(100) }
}

fn service_with(transport: Arc<dyn ChatTransport>, telemetry: TelemetryLogger) -> GenerationService {
    GenerationService::with_transport(transport, telemetry).with_retry_policy(fast_retry())
}

fn channel_logger() -> (TelemetryLogger, mpsc::UnboundedReceiver<TelemetryRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TelemetryLogger::new(Arc::new(ChannelSink { tx })), rx)
}

async fn next_record(rx: &mut mpsc::UnboundedReceiver<TelemetryRecord>) -> TelemetryRecord {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("telemetry record timed out")
        .expect("telemetry channel closed")
}

#[derive(Debug, PartialEq, Deserialize)]
struct Pair {
    a: String,
    b: f64,
}

// =========================================================================
// Happy path
// =========================================================================

#[tokio::test]
async fn text_generation_returns_content_and_metadata() {
    let transport = MockTransport::new(vec![Ok(completion_with("A short summary.", "stop"))]);
    let (logger, mut rx) = channel_logger();
    let service = service_with(transport.clone(), logger);
    let user_id = Uuid::new_v4();
    let note_id = Uuid::new_v4();
    let request = GenerationRequest::new("Summarize.", "Long note text").with_correlation(Some(user_id), Some(note_id));

    let result = service.generate(&request).await.unwrap();
    assert_eq!(result.data, Completion::Text("A short summary.".into()));
    assert_eq!(result.metadata.model_used, "openai/gpt-4o-mini");
    assert_eq!(result.metadata.tokens_used, Some(30));
    assert_eq!(transport.call_count(), 1);

    let record = next_record(&mut rx).await;
    assert_eq!(record.status, GenerationStatus::Success);
    assert_eq!(record.user_id, Some(user_id));
    assert_eq!(record.note_id, Some(note_id));
    assert_eq!(record.tokens_used, Some(30));
    assert_eq!(record.error_message, None);
}

#[tokio::test]
async fn default_model_is_sent_when_request_names_none() {
    let transport = MockTransport::new(vec![]);
    let service = service_with(transport.clone(), TelemetryLogger::disabled()).with_default_model("mistralai/mistral-7b");

    service.generate(&GenerationRequest::new("s", "u")).await.unwrap();
    let calls = transport.calls.lock().unwrap();
    assert_eq!(calls[0].0.model, "mistralai/mistral-7b");
}

#[tokio::test]
async fn structured_generation_round_trips_into_type() {
    let transport = MockTransport::new(vec![Ok(completion_with(r#"{"a": "tag", "b": 0.75}"#, "stop"))]);
    let service = service_with(transport.clone(), TelemetryLogger::disabled());
    let request = GenerationRequest::new("Extract.", "note").with_schema(ab_schema());

    let result = service.generate_structured::<Pair>(&request).await.unwrap();
    assert_eq!(result.data, Pair { a: "tag".into(), b: 0.75 });

    let calls = transport.calls.lock().unwrap();
    let format = calls[0].0.response_format.as_ref().expect("schema forwarded");
    assert_eq!(format.json_schema.name, "pair");
    assert!(format.json_schema.strict);
}

#[tokio::test]
async fn generate_text_flattens_structured_output() {
    let transport = MockTransport::new(vec![Ok(completion_with(r#"{"a":"x","b":1}"#, "stop"))]);
    let service = service_with(transport, TelemetryLogger::disabled());
    let request = GenerationRequest::new("s", "u").with_schema(ab_schema());

    let result = service.generate_text(&request).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&result.data).unwrap();
    assert_eq!(value, json!({ "a": "x", "b": 1 }));
}

#[tokio::test]
async fn schema_violation_is_parse_and_names_field() {
    let transport = MockTransport::new(vec![Ok(completion_with(r#"{"a": "x"}"#, "stop"))]);
    let (logger, mut rx) = channel_logger();
    let service = service_with(transport.clone(), logger);
    let request = GenerationRequest::new("s", "u").with_schema(ab_schema());

    let err = service.generate(&request).await.unwrap_err();
    assert!(matches!(err, GenerationError::Parse(ref m) if m.contains("`b`")), "{err:?}");
    assert_eq!(transport.call_count(), 1, "parse errors are not retried");

    let record = next_record(&mut rx).await;
    assert_eq!(record.status, GenerationStatus::Failure);
    assert!(record.error_message.unwrap().contains("`b`"));
}

#[tokio::test]
async fn wrong_field_type_is_parse_naming_types() {
    let transport = MockTransport::new(vec![Ok(completion_with(r#"{"a": 5, "b": 1}"#, "stop"))]);
    let service = service_with(transport, TelemetryLogger::disabled());
    let request = GenerationRequest::new("s", "u").with_schema(ab_schema());

    let GenerationError::Parse(message) = service.generate(&request).await.unwrap_err() else {
        panic!("expected parse error");
    };
    assert!(message.contains("`a`"));
    assert!(message.contains("string"));
    assert!(message.contains("number"));
}

#[tokio::test]
async fn truncated_completion_is_parse_even_if_valid_json() {
    let transport = MockTransport::new(vec![Ok(completion_with(r#"{"a": "x", "b": 1}"#, "length"))]);
    let service = service_with(transport, TelemetryLogger::disabled());
    let request = GenerationRequest::new("s", "u").with_schema(ab_schema());

    let err = service.generate(&request).await.unwrap_err();
    assert!(matches!(err, GenerationError::Parse(ref m) if m.contains("truncated")));
}

// =========================================================================
// Validation gate
// =========================================================================

#[tokio::test]
async fn invalid_request_makes_no_network_call_but_is_logged() {
    let transport = MockTransport::new(vec![]);
    let (logger, mut rx) = channel_logger();
    let service = service_with(transport.clone(), logger);

    for request in [
        GenerationRequest::new("s", ""),
        GenerationRequest::new("s", "x".repeat(50_001)),
        GenerationRequest::new("", "u"),
    ] {
        let err = service.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
        let record = next_record(&mut rx).await;
        assert_eq!(record.status, GenerationStatus::Failure);
    }
    assert_eq!(transport.call_count(), 0);
}

// =========================================================================
// Retry behavior through the service
// =========================================================================

#[tokio::test(start_paused = true)]
async fn service_errors_retry_to_budget_then_surface() {
    let transport = Arc::new(AlwaysFailing {
        error: GenerationError::Service("status 503: overloaded".into()),
        calls: Mutex::new(Vec::new()),
    });
    let (logger, mut rx) = channel_logger();
    let service = GenerationService::with_transport(transport.clone(), logger)
        .with_retry_policy(RetryPolicy { attempts: 2, base_delay: Duration::from_millis(1000) });

    let err = service.generate(&GenerationRequest::new("s", "u")).await.unwrap_err();
    assert!(matches!(err, GenerationError::Service(_)));

    let calls = transport.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2] - calls[1], (calls[1] - calls[0]) * 2);

    let record = next_record(&mut rx).await;
    assert_eq!(record.status, GenerationStatus::Failure);
    assert!(record.generation_time_ms >= 3000, "elapsed spans all retries");
    assert!(rx.try_recv().is_err(), "exactly one record per call");
}

#[tokio::test(start_paused = true)]
async fn validation_from_transport_is_not_retried() {
    let transport = Arc::new(AlwaysFailing {
        error: GenerationError::Validation("status 400: bad schema".into()),
        calls: Mutex::new(Vec::new()),
    });
    let service = service_with(transport.clone(), TelemetryLogger::disabled());

    let err = service.generate(&GenerationRequest::new("s", "u")).await.unwrap_err();
    assert!(matches!(err, GenerationError::Validation(_)));
    assert_eq!(transport.calls.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_then_success_reports_total_time() {
    let transport = MockTransport::new(vec![
        Err(GenerationError::Timeout("60s".into())),
        Ok(completion_with("recovered", "stop")),
    ]);
    let service = service_with(transport.clone(), TelemetryLogger::disabled());

    let result = service.generate(&GenerationRequest::new("s", "u")).await.unwrap();
    assert_eq!(result.data, Completion::Text("recovered".into()));
    assert_eq!(transport.call_count(), 2);
    assert!(result.metadata.generation_time_ms >= 100);
}

// =========================================================================
// Telemetry isolation
// =========================================================================

#[tokio::test]
async fn broken_sink_does_not_change_outcome() {
    let transport = MockTransport::new(vec![
        Ok(completion_with("fine", "stop")),
        Err(GenerationError::Auth("status 401: bad key".into())),
    ]);
    let service = service_with(transport, TelemetryLogger::new(Arc::new(BrokenSink)));

    let ok = service.generate(&GenerationRequest::new("s", "u")).await.unwrap();
    assert_eq!(ok.data, Completion::Text("fine".into()));

    let err = service.generate(&GenerationRequest::new("s", "u")).await.unwrap_err();
    assert_eq!(err, GenerationError::Auth("status 401: bad key".into()));
}

#[tokio::test]
async fn hanging_sink_does_not_delay_caller() {
    let transport = MockTransport::new(vec![]);
    let service = service_with(transport, TelemetryLogger::new(Arc::new(HangingSink)));

    let result = tokio::time::timeout(Duration::from_secs(1), service.generate(&GenerationRequest::new("s", "u")))
        .await
        .expect("generate must not wait on telemetry");
    assert!(result.is_ok());
}

#[tokio::test]
async fn failure_record_is_written_once_drained() {
    let transport = MockTransport::new(vec![Err(GenerationError::Auth("status 401: bad key".into()))]);
    let (logger, mut rx) = channel_logger();
    let service = service_with(transport, logger.clone());

    let err = service.generate(&GenerationRequest::new("s", "u")).await.unwrap_err();
    assert!(matches!(err, GenerationError::Auth(_)));

    assert!(logger.drain(Duration::from_secs(1)).await);
    let record = rx.try_recv().expect("failure record written before drain returns");
    assert_eq!(record.status, GenerationStatus::Failure);
    assert_eq!(record.error_message.as_deref(), Some("authentication failed: status 401: bad key"));
}
