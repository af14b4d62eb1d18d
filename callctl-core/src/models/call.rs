//! Call record as stored in the `calls` table

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A phone call record.
///
/// Only the columns the tooling reads are typed; everything else lands in
/// `extra` so schema additions never break decoding. Typed columns decode
/// leniently: text columns accept any scalar, numeric columns accept numbers
/// or numeric strings, and `transcript` may be text or a message array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Call {
    pub id: Value,
    #[serde(default)]
    pub organization_id: Option<Value>,
    #[serde(default)]
    pub campaign_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub vapi_call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub outcome: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub sentiment: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub transcript: Option<Value>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub recording_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub cost: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub duration_seconds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl Call {
    /// Decode a raw store row.
    pub fn from_row(row: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(row))
    }

    /// Identifier rendered without JSON quoting.
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Transcript as plain text. Message arrays render one `role: message`
    /// line per entry.
    pub fn transcript_text(&self) -> Option<String> {
        let text = match self.transcript.as_ref()? {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            Value::Array(messages) => messages
                .iter()
                .map(message_line)
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    /// One-line summary for list output.
    pub fn summary_line(&self) -> String {
        let transcript = match self.transcript_text() {
            Some(t) => format!("{} chars", t.chars().count()),
            None => "-".to_string(),
        };
        format!(
            "{}  {:<12} {:<12} {:<16} transcript={} recording={}",
            self.id_string(),
            self.status.as_deref().unwrap_or("-"),
            self.outcome.as_deref().unwrap_or("-"),
            self.phone_number.as_deref().unwrap_or("-"),
            transcript,
            if self.recording_url.is_some() { "yes" } else { "no" },
        )
    }
}

fn message_line(entry: &Value) -> String {
    let text = |key: &str| entry.get(key).and_then(Value::as_str);
    match (text("role"), text("message").or_else(|| text("content"))) {
        (Some(role), Some(message)) => format!("{}: {}", role, message),
        (None, Some(message)) => message.to_string(),
        _ => match entry {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_with_unknown_columns() {
        let row = json!({
            "id": "c-1",
            "status": "completed",
            "qualification_score": 7,
            "transcript": "AI: hello"
        });
        let Value::Object(row) = row else { unreachable!() };
        let call = Call::from_row(row).unwrap();

        assert_eq!(call.id_string(), "c-1");
        assert_eq!(call.status.as_deref(), Some("completed"));
        assert_eq!(call.extra.get("qualification_score"), Some(&json!(7)));
    }

    #[test]
    fn numeric_columns_accept_floats_and_strings() {
        let Value::Object(row) = json!({
            "id": "c-1",
            "duration_seconds": 125.0,
            "cost": "0.42"
        }) else {
            unreachable!()
        };
        let call = Call::from_row(row).unwrap();

        assert_eq!(call.duration_seconds, Some(125.0));
        assert_eq!(call.cost, Some(0.42));
    }

    #[test]
    fn transcript_may_be_a_message_array() {
        let Value::Object(row) = json!({
            "id": "c-1",
            "status": 3,
            "transcript": [
                {"role": "bot", "message": "Hello"},
                {"role": "user", "message": "Hi"}
            ]
        }) else {
            unreachable!()
        };
        let call = Call::from_row(row).unwrap();

        assert_eq!(call.transcript_text().as_deref(), Some("bot: Hello\nuser: Hi"));
        assert_eq!(call.status.as_deref(), Some("3"));
        assert!(call.summary_line().contains("transcript=19 chars"));
    }

    #[test]
    fn empty_transcript_is_none() {
        let call = Call {
            transcript: Some(json!("")),
            ..Default::default()
        };
        assert!(call.transcript_text().is_none());
        assert!(call.summary_line().contains("transcript=-"));
    }

    #[test]
    fn numeric_id_renders_plain() {
        let call = Call {
            id: json!(42),
            ..Default::default()
        };
        assert_eq!(call.id_string(), "42");
        assert!(call.summary_line().starts_with("42  "));
    }
}
