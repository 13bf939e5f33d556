//! Wire types for OpenAI-compatible chat completion APIs
use serde::{Deserialize, Serialize};

/// Chat completion request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier (e.g., "anthropic/claude-3.5-sonnet")
    pub model: String,

    pub messages: Vec<ChatMessage>,

    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Requested reply format (omitted for plain text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormatSpec>,
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub const fn user(content: MessageContent) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

/// Message content can be either a simple string or an array of content parts
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Content part of a multimodal user message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference; tribunal always sends inline data URLs
#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: &'static str,
}

/// `response_format` request field
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResponseFormatSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl ResponseFormatSpec {
    pub const JSON_OBJECT: Self = Self {
        kind: "json_object",
    };
}

/// Chat completion response body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,

    #[serde(default)]
    pub usage: Option<Usage>,

    /// Some gateways report upstream failures inside a 200 response
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

/// Error envelope, both for non-2xx bodies and in-band errors
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,

    /// HTTP-like status code, when the gateway provides one
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self.code.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: ApiError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multimodal_message_serialization() {
        let message = ChatMessage::user(MessageContent::Parts(vec![
            ContentPart::Text {
                text: "look".to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/jpeg;base64,AAAA".to_string(),
                    detail: "high",
                },
            },
        ]));

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(
            json["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }

    #[test]
    fn test_text_request_omits_response_format() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::system("sys")],
            temperature: 0.5,
            max_tokens: 10,
            response_format: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("response_format").is_none());
        assert_eq!(json["messages"][0]["content"], "sys");
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{
            "id": "gen-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hi"));
        assert_eq!(response.usage.unwrap().prompt_tokens, 12);
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_code_parsing() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error": {"message": "busy", "code": 503}}"#).unwrap();
        assert_eq!(body.error.status_code(), Some(503));

        let body: ErrorBody =
            serde_json::from_str(r#"{"error": {"message": "x", "code": "429"}}"#).unwrap();
        assert_eq!(body.error.status_code(), Some(429));

        let body: ErrorBody = serde_json::from_str(r#"{"error": {"message": "x"}}"#).unwrap();
        assert_eq!(body.error.status_code(), None);
    }
}
