/// Operation spans
///
/// Every account operation is bracketed by a span carrying the request's
/// correlation id. When the operation finishes the span is closed and handed
/// to a [`SpanSink`]. Sinks never fail the operation: a collector that is
/// down costs a `warn!` line and nothing else.
///
/// # Sinks
///
/// - [`CollectorSink`]: HTTP POST to `{endpoint}/api/traces`, 1s timeout,
///   sent from a background task
/// - [`LogSink`]: writes the span as a `tracing` event
/// - [`RecordingSink`]: keeps spans in memory for tests
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use usersvc_shared::telemetry::{LogSink, SpanEmitter};
///
/// # async fn example() {
/// let spans = SpanEmitter::new(Arc::new(LogSink));
///
/// let result: Result<u32, String> = spans
///     .instrument("login", "trace-123", async { Ok(42) })
///     .await;
/// assert_eq!(result, Ok(42));
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Collector requests give up after this long
pub const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(1);

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanOutcome {
    Ok,
    Error,
    /// Future dropped before completion (client went away)
    Cancelled,
}

/// A closed span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub operation_name: String,

    /// Correlation id from `X-Trace-Id`, or generated per request
    pub trace_id: String,

    pub span_id: Uuid,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    pub duration_ms: i64,

    pub outcome: SpanOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Destination for closed spans
#[async_trait]
pub trait SpanSink: Send + Sync {
    /// Delivers a span; failures are handled inside the sink
    async fn emit(&self, span: SpanRecord);
}

struct OpenSpan {
    operation: &'static str,
    trace_id: String,
    span_id: Uuid,
    start: DateTime<Utc>,
}

impl OpenSpan {
    fn close(self, outcome: SpanOutcome, error: Option<String>) -> SpanRecord {
        let end = Utc::now();
        SpanRecord {
            operation_name: self.operation.to_string(),
            trace_id: self.trace_id,
            span_id: self.span_id,
            start_time: self.start,
            end_time: end,
            duration_ms: (end - self.start).num_milliseconds(),
            outcome,
            error,
        }
    }
}

/// Emits the span from `Drop` if the operation never completed
struct CancelGuard {
    span: Option<OpenSpan>,
    sink: Arc<dyn SpanSink>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let Some(span) = self.span.take() else {
            return;
        };
        let record = span.close(SpanOutcome::Cancelled, None);
        let sink = self.sink.clone();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { sink.emit(record).await });
        }
    }
}

/// Opens, closes and emits operation spans
#[derive(Clone)]
pub struct SpanEmitter {
    sink: Arc<dyn SpanSink>,
}

impl SpanEmitter {
    pub fn new(sink: Arc<dyn SpanSink>) -> Self {
        Self { sink }
    }

    /// Runs `fut` inside a span named `operation`
    ///
    /// The span is emitted whether the future returns `Ok`, returns `Err`
    /// or is dropped part-way.
    pub async fn instrument<T, E, F>(
        &self,
        operation: &'static str,
        correlation_id: &str,
        fut: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        let mut guard = CancelGuard {
            span: Some(OpenSpan {
                operation,
                trace_id: correlation_id.to_string(),
                span_id: Uuid::new_v4(),
                start: Utc::now(),
            }),
            sink: self.sink.clone(),
        };

        let result = fut.await;

        if let Some(span) = guard.span.take() {
            let record = match &result {
                Ok(_) => span.close(SpanOutcome::Ok, None),
                Err(e) => span.close(SpanOutcome::Error, Some(e.to_string())),
            };
            self.sink.emit(record).await;
        }

        result
    }
}

/// Posts spans to a trace collector
#[derive(Clone)]
pub struct CollectorSink {
    client: reqwest::Client,
    url: String,
}

impl CollectorSink {
    /// `endpoint` is the collector base URL; spans go to `{endpoint}/api/traces`
    pub fn new(endpoint: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(COLLECTOR_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: format!("{}/api/traces", endpoint.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SpanSink for CollectorSink {
    async fn emit(&self, span: SpanRecord) {
        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&span).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(
                        status = %resp.status(),
                        operation = %span.operation_name,
                        "Trace collector rejected span"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        operation = %span.operation_name,
                        "Failed to export span"
                    );
                }
            }
        });
    }
}

/// Writes spans to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl SpanSink for LogSink {
    async fn emit(&self, span: SpanRecord) {
        tracing::debug!(
            operation = %span.operation_name,
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            duration_ms = span.duration_ms,
            outcome = ?span.outcome,
            "Span closed"
        );
    }
}

/// Keeps every emitted span
#[derive(Debug, Default)]
pub struct RecordingSink {
    spans: Mutex<Vec<SpanRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of spans emitted so far
    pub fn spans(&self) -> Vec<SpanRecord> {
        match self.spans.lock() {
            Ok(spans) => spans.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SpanSink for RecordingSink {
    async fn emit(&self, span: SpanRecord) {
        match self.spans.lock() {
            Ok(mut spans) => spans.push(span),
            Err(poisoned) => poisoned.into_inner().push(span),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_span_emitted_on_success_and_error() {
        let sink = Arc::new(RecordingSink::new());
        let spans = SpanEmitter::new(sink.clone());

        let ok: Result<u8, String> = spans.instrument("register", "t-1", async { Ok(1) }).await;
        let err: Result<u8, String> = spans
            .instrument("login", "t-2", async { Err("Invalid credentials".to_string()) })
            .await;

        assert_eq!(ok, Ok(1));
        assert!(err.is_err());

        let recorded = sink.spans();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].operation_name, "register");
        assert_eq!(recorded[0].trace_id, "t-1");
        assert_eq!(recorded[0].outcome, SpanOutcome::Ok);
        assert_eq!(recorded[1].outcome, SpanOutcome::Error);
        assert_eq!(recorded[1].error.as_deref(), Some("Invalid credentials"));
        assert!(recorded[1].end_time >= recorded[1].start_time);
    }

    #[tokio::test]
    async fn test_span_emitted_when_cancelled() {
        let sink = Arc::new(RecordingSink::new());
        let spans = SpanEmitter::new(sink.clone());

        let slow = spans.instrument("logout", "t-3", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), String>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), slow).await;
        assert!(timed_out.is_err());

        // Drop emission runs on a spawned task
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let recorded = sink.spans();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].outcome, SpanOutcome::Cancelled);
    }

    #[test]
    fn test_collector_url() {
        let sink = CollectorSink::new("http://jaeger:14268/").unwrap();
        assert_eq!(sink.url(), "http://jaeger:14268/api/traces");
    }

    #[tokio::test]
    async fn test_unreachable_collector_does_not_fail() {
        // Port 9 (discard) on localhost is almost never listening
        let sink = CollectorSink::new("http://127.0.0.1:9").unwrap();
        let spans = SpanEmitter::new(Arc::new(sink));

        let result: Result<(), String> = spans.instrument("health", "t-4", async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_span_record_json() {
        let now = Utc::now();
        let record = SpanRecord {
            operation_name: "login".to_string(),
            trace_id: "abc".to_string(),
            span_id: Uuid::nil(),
            start_time: now,
            end_time: now,
            duration_ms: 0,
            outcome: SpanOutcome::Ok,
            error: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["outcome"], "ok");
        assert_eq!(value["trace_id"], "abc");
        assert!(value.get("error").is_none());
    }
}
