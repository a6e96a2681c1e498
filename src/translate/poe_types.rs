//! Type definitions for the Poe server bot protocol (version 1.0).
//!
//! Poe POSTs a JSON body whose `type` field selects the request kind. Query
//! requests are answered with a `text/event-stream` of `text` events closed by
//! a `done` event; everything else is answered with plain JSON.

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

pub const PROTOCOL_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// Request types (what Poe sends TO us)
// ---------------------------------------------------------------------------

/// Envelope used to dispatch on the request `type` before parsing the body.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub query: Vec<ProtocolMessage>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub skip_system_prompt: bool,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_query_id: Option<String>,
    // Catch-all for fields newer protocol versions add
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

/// One turn of the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMessage {
    /// Free-form on the wire; checked against [`Role`] during translation.
    pub role: String,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub name: String,
    /// Text Poe extracted from the file, when it could.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_content: Option<String>,
}

fn default_content_type() -> String {
    "text/markdown".to_string()
}

/// The closed set of speaker roles Poe uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Bot,
}

impl TryFrom<&str> for Role {
    type Error = TranslateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "bot" => Ok(Role::Bot),
            other => Err(TranslateError::UnrecognizedRole(other.to_string())),
        }
    }
}

/// Body of `report_feedback`, `report_reaction` and `report_error` requests.
/// Only the fields we log are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub feedback_type: Option<String>,
    #[serde(default)]
    pub reaction: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types (what we send BACK to Poe)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub allow_attachments: bool,
    pub expand_text_attachments: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduction_message: Option<String>,
    pub server_bot_dependencies: std::collections::HashMap<String, u32>,
}

/// One piece of the bot's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResponse {
    pub text: String,
}

impl PartialResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

// ---------------------------------------------------------------------------
// Streaming event types (SSE events we send back to Poe)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PoeEvent {
    Text(PartialResponse),
    Error(ErrorEventBody),
    Done(DoneEventBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEventBody {
    pub allow_retry: bool,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoneEventBody {}

impl PoeEvent {
    pub fn error(text: impl Into<String>) -> Self {
        PoeEvent::Error(ErrorEventBody {
            allow_retry: false,
            text: text.into(),
        })
    }

    pub fn done() -> Self {
        PoeEvent::Done(DoneEventBody::default())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            PoeEvent::Text(_) => "text",
            PoeEvent::Error(_) => "error",
            PoeEvent::Done(_) => "done",
        }
    }
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_request() {
        let body = serde_json::json!({
            "version": "1.0",
            "type": "query",
            "query": [
                {"role": "system", "content": "Be brief.", "content_type": "text/markdown"},
                {
                    "role": "user",
                    "content": "summarize",
                    "attachments": [{
                        "url": "https://pfst.cf2.poecdn.net/base/text/report.txt",
                        "content_type": "text/plain",
                        "name": "report.txt",
                        "parsed_content": "Quarterly numbers"
                    }]
                }
            ],
            "user_id": "u-1",
            "conversation_id": "c-1",
            "message_id": "m-1",
            "access_key": "ignored"
        });

        let req: QueryRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.query.len(), 2);
        assert_eq!(req.query[0].role, "system");
        assert!(req.query[0].attachments.is_empty());
        assert_eq!(
            req.query[1].attachments[0].parsed_content.as_deref(),
            Some("Quarterly numbers")
        );
        assert!(req.extra.contains_key("access_key"));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::try_from("system"), Ok(Role::System));
        assert_eq!(Role::try_from("bot"), Ok(Role::Bot));
        assert_eq!(Role::try_from("user"), Ok(Role::User));
        assert_eq!(
            Role::try_from("assistant"),
            Err(TranslateError::UnrecognizedRole("assistant".to_string()))
        );
    }

    #[test]
    fn test_event_payloads() {
        let text = PoeEvent::Text(PartialResponse::new("Hel"));
        assert_eq!(text.event_name(), "text");
        assert_eq!(serde_json::to_string(&text).unwrap(), r#"{"text":"Hel"}"#);

        let err = PoeEvent::error("boom");
        assert_eq!(err.event_name(), "error");
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"allow_retry":false,"text":"boom"}"#
        );

        assert_eq!(serde_json::to_string(&PoeEvent::done()).unwrap(), "{}");
    }
}
