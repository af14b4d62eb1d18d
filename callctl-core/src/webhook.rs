//! Calling-platform webhook payloads and their mapping onto `calls` rows
//!
//! The platform posts `{"message": {"type": ..., "call": {...}, ...}}`.
//! Only two event types change the database:
//!
//! - `end-of-call-report`: transcript, recording, cost, summary, final status
//! - `status-update`: live status
//!
//! Everything else is acknowledged and ignored.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::db::{Filter, StoreError, TableStore};
use crate::models::{Row, Table};

/// Column holding the platform's call id
pub const VAPI_CALL_ID_COLUMN: &str = "vapi_call_id";

/// Recording, transcript and message log produced by the platform
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub stereo_recording_url: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
}

/// Post-call analysis
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub success_evaluation: Option<Value>,
    #[serde(default)]
    pub structured_data: Option<Value>,
}

/// Call object as the platform represents it (webhooks and `GET /call`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VapiCall {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ended_reason: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub customer: Option<Value>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub cost_breakdown: Option<Value>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// The `message` object of a webhook
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub call: Option<VapiCall>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ended_reason: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub cost_breakdown: Option<Value>,
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
}

/// Top-level webhook body
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub message: WebhookMessage,
}

impl WebhookEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Event types the shim understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    EndOfCallReport,
    StatusUpdate,
    Other(String),
}

impl WebhookMessage {
    pub fn event(&self) -> EventKind {
        match self.kind.as_str() {
            "end-of-call-report" => EventKind::EndOfCallReport,
            "status-update" => EventKind::StatusUpdate,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// Final call status from the platform's `endedReason`.
pub fn status_from_ended_reason(reason: Option<&str>) -> &'static str {
    let Some(reason) = reason else {
        return "completed";
    };
    let reason = reason.to_ascii_lowercase();
    if reason.contains("error") || reason.contains("failed") {
        "failed"
    } else if reason == "customer-did-not-answer" || reason == "no-answer" {
        "no-answer"
    } else if reason == "customer-busy" {
        "busy"
    } else if reason.contains("voicemail") {
        "voicemail"
    } else {
        "completed"
    }
}

/// Live call status from a `status-update` event; unknown values map to None.
pub fn status_from_update(status: &str) -> Option<&'static str> {
    match status {
        "queued" => Some("queued"),
        "ringing" => Some("ringing"),
        "in-progress" | "forwarding" => Some("in-progress"),
        "ended" => Some("completed"),
        _ => None,
    }
}

/// Seconds between two RFC 3339 timestamps.
fn duration_between(started: Option<&str>, ended: Option<&str>) -> Option<i64> {
    let started = DateTime::parse_from_rfc3339(started?).ok()?;
    let ended = DateTime::parse_from_rfc3339(ended?).ok()?;
    let secs = (ended - started).num_seconds();
    (secs >= 0).then_some(secs)
}

/// Fields written onto a `calls` row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_breakdown: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

impl CallPatch {
    /// Patch for an end-of-call report. Message-level fields win over the
    /// nested call, artifact and analysis objects.
    pub fn from_end_of_call(msg: &WebhookMessage) -> Self {
        let call = msg.call.as_ref();
        let artifact = msg
            .artifact
            .as_ref()
            .or_else(|| call.and_then(|c| c.artifact.as_ref()));
        let analysis = msg
            .analysis
            .as_ref()
            .or_else(|| call.and_then(|c| c.analysis.as_ref()));

        let ended_reason = msg
            .ended_reason
            .clone()
            .or_else(|| call.and_then(|c| c.ended_reason.clone()));
        let started_at = msg
            .started_at
            .clone()
            .or_else(|| call.and_then(|c| c.started_at.clone()));
        let ended_at = msg
            .ended_at
            .clone()
            .or_else(|| call.and_then(|c| c.ended_at.clone()));
        let duration_seconds = msg
            .duration_seconds
            .map(|d| d.round() as i64)
            .or_else(|| duration_between(started_at.as_deref(), ended_at.as_deref()));

        Self {
            status: Some(status_from_ended_reason(ended_reason.as_deref()).to_string()),
            transcript: msg
                .transcript
                .clone()
                .or_else(|| artifact.and_then(|a| a.transcript.clone()))
                .or_else(|| call.and_then(|c| c.transcript.clone())),
            recording_url: msg
                .recording_url
                .clone()
                .or_else(|| artifact.and_then(|a| a.recording_url.clone()))
                .or_else(|| call.and_then(|c| c.recording_url.clone())),
            summary: msg
                .summary
                .clone()
                .or_else(|| analysis.and_then(|a| a.summary.clone()))
                .or_else(|| call.and_then(|c| c.summary.clone())),
            cost: msg.cost.or_else(|| call.and_then(|c| c.cost)),
            cost_breakdown: msg
                .cost_breakdown
                .clone()
                .or_else(|| call.and_then(|c| c.cost_breakdown.clone())),
            messages: msg
                .messages
                .clone()
                .or_else(|| artifact.and_then(|a| a.messages.clone())),
            ended_reason,
            started_at,
            ended_at,
            duration_seconds,
        }
    }

    /// Patch for a status update, if the status is one we track.
    pub fn from_status_update(msg: &WebhookMessage) -> Option<Self> {
        let raw = msg
            .status
            .as_deref()
            .or_else(|| msg.call.as_ref().and_then(|c| c.status.as_deref()))?;
        let status = status_from_update(raw)?;
        Some(Self {
            status: Some(status.to_string()),
            ..Default::default()
        })
    }

    /// Patch from a call fetched from the platform API. Only ended calls get a
    /// final status; others just record their live status.
    pub fn from_call(call: &VapiCall) -> Self {
        if call.status.as_deref() == Some("ended") || call.ended_reason.is_some() {
            let msg = WebhookMessage {
                kind: "end-of-call-report".to_string(),
                call: Some(call.clone()),
                ..Default::default()
            };
            return Self::from_end_of_call(&msg);
        }
        Self {
            status: call
                .status
                .as_deref()
                .and_then(status_from_update)
                .map(str::to_string),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_row(&self) -> Result<Row, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Row::new()),
        }
    }
}

/// Which `calls` row an event refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallTarget {
    pub column: &'static str,
    pub value: String,
}

impl CallTarget {
    /// Our own id passed through call metadata wins over the platform id.
    pub fn for_call(call: &VapiCall) -> Self {
        let internal = call.metadata.as_ref().and_then(|meta| {
            ["callId", "call_id"]
                .iter()
                .filter_map(|k| meta.get(*k))
                .find_map(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
        });

        match internal {
            Some(id) => Self {
                column: "id",
                value: id,
            },
            None => Self {
                column: VAPI_CALL_ID_COLUMN,
                value: call.id.clone(),
            },
        }
    }

    fn filter(&self) -> Result<Filter, StoreError> {
        Ok(Filter::eq(self.column, self.value.clone())?)
    }
}

/// What applying an event did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Applied {
    Updated { target: CallTarget, rows: usize },
    UnknownCall { target: CallTarget },
    Ignored { kind: String },
    MissingCall { kind: String },
}

/// Write a patch onto the targeted call. Never inserts.
pub async fn apply_patch(
    store: &dyn TableStore,
    target: CallTarget,
    patch: &CallPatch,
) -> Result<Applied, StoreError> {
    let rows = store
        .update(Table::Calls, &target.filter()?, &patch.to_row()?)
        .await?;

    match rows.len() {
        0 => {
            warn!(column = target.column, call_id = %target.value, "No call record matched");
            Ok(Applied::UnknownCall { target })
        }
        n => {
            if n > 1 {
                warn!(column = target.column, call_id = %target.value, rows = n, "Multiple call records matched");
            }
            info!(column = target.column, call_id = %target.value, status = ?patch.status, "Updated call record");
            Ok(Applied::Updated { target, rows: n })
        }
    }
}

/// Persist one webhook event.
pub async fn apply_event(
    store: &dyn TableStore,
    message: &WebhookMessage,
) -> Result<Applied, StoreError> {
    let patch = match message.event() {
        EventKind::EndOfCallReport => CallPatch::from_end_of_call(message),
        EventKind::StatusUpdate => match CallPatch::from_status_update(message) {
            Some(patch) => patch,
            None => {
                debug!(status = ?message.status, "Untracked status");
                return Ok(Applied::Ignored {
                    kind: message.kind.clone(),
                });
            }
        },
        EventKind::Other(kind) => {
            debug!(kind = %kind, "Ignoring webhook event");
            return Ok(Applied::Ignored { kind });
        }
    };

    let Some(call) = message.call.as_ref() else {
        warn!(kind = %message.kind, "Webhook event has no call object");
        return Ok(Applied::MissingCall {
            kind: message.kind.clone(),
        });
    };

    apply_patch(store, CallTarget::for_call(call), &patch).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde_json::json;

    fn end_of_call() -> Value {
        json!({
            "message": {
                "type": "end-of-call-report",
                "endedReason": "customer-ended-call",
                "call": {"id": "vapi-123", "startedAt": "2024-05-01T10:00:00Z", "endedAt": "2024-05-01T10:02:05Z"},
                "transcript": "AI: Hi there\nUser: Hello",
                "recordingUrl": "https://storage.example/rec.wav",
                "cost": 0.42,
                "costBreakdown": {"llm": 0.1, "tts": 0.2, "stt": 0.12},
                "messages": [{"role": "bot", "message": "Hi there"}],
                "analysis": {"summary": "Customer interested"}
            }
        })
    }

    fn envelope(value: Value) -> WebhookEnvelope {
        serde_json::from_value(value).unwrap()
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    #[test]
    fn end_of_call_patch_fields() {
        let msg = envelope(end_of_call()).message;
        let patch = CallPatch::from_end_of_call(&msg);

        assert_eq!(patch.status.as_deref(), Some("completed"));
        assert_eq!(patch.transcript.as_deref(), Some("AI: Hi there\nUser: Hello"));
        assert_eq!(patch.recording_url.as_deref(), Some("https://storage.example/rec.wav"));
        assert_eq!(patch.summary.as_deref(), Some("Customer interested"));
        assert_eq!(patch.cost, Some(0.42));
        assert_eq!(patch.duration_seconds, Some(125));
        assert_eq!(patch.messages.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn artifact_fills_missing_message_fields() {
        let msg = envelope(json!({
            "message": {
                "type": "end-of-call-report",
                "call": {"id": "v"},
                "artifact": {"transcript": "from artifact", "recordingUrl": "https://a/r.wav"}
            }
        }))
        .message;
        let patch = CallPatch::from_end_of_call(&msg);
        assert_eq!(patch.transcript.as_deref(), Some("from artifact"));
        assert_eq!(patch.recording_url.as_deref(), Some("https://a/r.wav"));
    }

    #[test]
    fn ended_reason_mapping() {
        assert_eq!(status_from_ended_reason(None), "completed");
        assert_eq!(status_from_ended_reason(Some("customer-did-not-answer")), "no-answer");
        assert_eq!(status_from_ended_reason(Some("customer-busy")), "busy");
        assert_eq!(status_from_ended_reason(Some("voicemail")), "voicemail");
        assert_eq!(
            status_from_ended_reason(Some("pipeline-error-openai-llm-failed")),
            "failed"
        );
        assert_eq!(status_from_ended_reason(Some("assistant-ended-call")), "completed");
    }

    #[test]
    fn status_update_mapping() {
        assert_eq!(status_from_update("forwarding"), Some("in-progress"));
        assert_eq!(status_from_update("ended"), Some("completed"));
        assert_eq!(status_from_update("scheduled"), None);
    }

    #[test]
    fn metadata_call_id_targets_primary_key() {
        let call: VapiCall = serde_json::from_value(json!({
            "id": "vapi-1",
            "metadata": {"call_id": "c-77"}
        }))
        .unwrap();
        assert_eq!(
            CallTarget::for_call(&call),
            CallTarget { column: "id", value: "c-77".into() }
        );

        let call: VapiCall = serde_json::from_value(json!({"id": "vapi-1"})).unwrap();
        assert_eq!(CallTarget::for_call(&call).column, VAPI_CALL_ID_COLUMN);
    }

    #[test]
    fn patch_row_skips_unset_fields() {
        let patch = CallPatch {
            status: Some("ringing".into()),
            ..Default::default()
        };
        assert_eq!(patch.to_row().unwrap(), row(json!({"status": "ringing"})));
        assert!(CallPatch::default().is_empty());
    }

    #[tokio::test]
    async fn known_call_updated_exactly_once() {
        let store = MemoryStore::new().with_rows(
            Table::Calls,
            vec![
                row(json!({"id": "c-1", "vapi_call_id": "vapi-123", "status": "in-progress"})),
                row(json!({"id": "c-2", "vapi_call_id": "vapi-999", "status": "in-progress"})),
            ],
        );

        let msg = envelope(end_of_call()).message;
        let applied = apply_event(&store, &msg).await.unwrap();
        assert!(matches!(applied, Applied::Updated { rows: 1, .. }));

        let rows = store.rows(Table::Calls);
        assert_eq!(rows[0]["status"], json!("completed"));
        assert_eq!(rows[0]["recording_url"], json!("https://storage.example/rec.wav"));
        assert_eq!(rows[1]["status"], json!("in-progress"));
    }

    #[tokio::test]
    async fn unknown_call_creates_nothing() {
        let store = MemoryStore::new();
        let msg = envelope(end_of_call()).message;

        let applied = apply_event(&store, &msg).await.unwrap();

        assert!(matches!(applied, Applied::UnknownCall { .. }));
        assert!(store.rows(Table::Calls).is_empty());
    }

    #[tokio::test]
    async fn other_events_are_ignored() {
        let store = MemoryStore::new();
        let msg = envelope(json!({"message": {"type": "speech-update", "call": {"id": "v"}}})).message;
        assert_eq!(
            apply_event(&store, &msg).await.unwrap(),
            Applied::Ignored { kind: "speech-update".into() }
        );
    }

    #[tokio::test]
    async fn missing_call_object_is_reported() {
        let store = MemoryStore::new();
        let msg = envelope(json!({"message": {"type": "status-update", "status": "ringing"}})).message;
        assert!(matches!(
            apply_event(&store, &msg).await.unwrap(),
            Applied::MissingCall { .. }
        ));
    }
}
