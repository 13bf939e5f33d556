use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client as ReqwestClient, Response, StatusCode};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::types::{
    ApiError, ChatMessage, ChatRequest, ChatResponse, ContentPart, ErrorBody, ImageUrl,
    MessageContent, ResponseFormatSpec,
};
use crate::domain::error::ProviderError;
use crate::domain::models::{ProviderConfig, TokenUsage};
use crate::domain::ports::{Completion, CompletionRequest, ProviderClient, ResponseFormat};
use crate::infrastructure::logging::scrub_secrets;

/// Appended to the system prompt when a JSON-mode request is re-sent as text
const JSON_TEXT_MODE_NOTE: &str =
    "\n\nIMPORTANT: Output MUST be valid JSON. No markdown, no explanations.";

const PROJECT_URL: &str = env!("CARGO_PKG_REPOSITORY");
const PROJECT_NAME: &str = "Tribunal";

/// HTTP client for OpenAI-compatible chat completion APIs (OpenRouter by default)
///
/// - Connection pooling and reuse (via `reqwest::Client`)
/// - Client-side rate limiting shared by every branch
/// - Typed status mapping onto [`ProviderError`]
///
/// Retries are owned by the pipeline, so each `complete` call is exactly one
/// logical request (plus the one-off text-mode resend for JSON rejections).
pub struct HttpProviderClient {
    http_client: ReqwestClient,
    base_url: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HttpProviderClient {
    /// Create a client from provider settings and a resolved API key
    pub fn new(config: &ProviderConfig, api_key: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("API key contains characters not allowed in a header")?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            "HTTP-Referer",
            header::HeaderValue::from_static(PROJECT_URL),
        );
        headers.insert("X-Title", header::HeaderValue::from_static(PROJECT_NAME));

        let http_client = ReqwestClient::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(config.timeout_secs))
            .tcp_nodelay(true)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        info!(
            base_url = %config.base_url,
            rate_limit_rps = rps.get(),
            timeout_secs = config.timeout_secs,
            "Initialized provider client"
        );

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    fn build_body(request: &CompletionRequest, json_mode: bool) -> ChatRequest {
        let mut system = request.system_prompt.clone();
        if request.response_format == ResponseFormat::Json && !json_mode {
            system.push_str(JSON_TEXT_MODE_NOTE);
        }

        let content = if request.vision_inputs.is_empty() {
            MessageContent::Text(request.prompt.clone())
        } else {
            let mut parts = vec![ContentPart::Text {
                text: request.prompt.clone(),
            }];
            for input in &request.vision_inputs {
                parts.push(ContentPart::Text {
                    text: input.caption.clone(),
                });
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!(
                            "data:{};base64,{}",
                            input.image.media_type, input.image.data_base64
                        ),
                        detail: "high",
                    },
                });
            }
            MessageContent::Parts(parts)
        };

        ChatRequest {
            model: request.model.id.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(content)],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: json_mode.then_some(ResponseFormatSpec::JSON_OBJECT),
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<Completion, (ProviderError, Option<StatusCode>)> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %body.model, "POST chat completion");

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| (map_transport_error(&e), None))?;

        Self::handle_response(response).await
    }

    async fn handle_response(
        response: Response,
    ) -> Result<Completion, (ProviderError, Option<StatusCode>)> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            let message = error_message(&body);
            warn!(status = %status, error = %message, "Provider returned an error status");
            return Err((map_status(status, message), Some(status)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| (ProviderError::ServerError(format!("malformed response: {e}")), None))?;

        if let Some(error) = parsed.error {
            return Err((map_in_band_error(&error), None));
        }

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(Completion {
            text,
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    #[instrument(skip_all, fields(model = %request.model.id, max_tokens = request.max_tokens))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let json_mode = request.response_format == ResponseFormat::Json;
        let result = self.send(&Self::build_body(&request, json_mode)).await;

        let result = match result {
            Err((_, Some(StatusCode::BAD_REQUEST))) if json_mode => {
                warn!("Model rejected JSON mode, retrying as text");
                self.send(&Self::build_body(&request, false)).await
            }
            other => other,
        };

        match result {
            Ok(completion) => {
                if let Some(usage) = completion.usage {
                    debug!(
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "Completion received"
                    );
                }
                Ok(completion)
            }
            Err((error, _)) => Err(error),
        }
    }
}

/// Classify an HTTP status code
fn map_status(status: StatusCode, message: String) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::AuthError(message),
        429 | 529 => ProviderError::RateLimited(message),
        408 | 504 => ProviderError::Timeout,
        503 => ProviderError::Unavailable(message),
        _ if status.is_server_error() => ProviderError::ServerError(format!("{status}: {message}")),
        _ => ProviderError::Unavailable(format!("{status}: {message}")),
    }
}

fn map_transport_error(error: &reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::ServerError(scrub_secrets(&error.to_string()))
    }
}

fn map_in_band_error(error: &ApiError) -> ProviderError {
    let message = scrub_secrets(&error.message);
    match error.status_code().and_then(|code| StatusCode::from_u16(code).ok()) {
        Some(status) => map_status(status, message),
        None => ProviderError::ServerError(message),
    }
}

/// Extract a readable, credential-free message from an error body
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.chars().take(500).collect());
    scrub_secrets(&message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ModelDescriptor, Snapshot};
    use crate::domain::ports::VisionInput;
    use mockito::{Matcher, Server};

    fn success_body(text: &str) -> String {
        serde_json::json!({
            "id": "gen-123",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
        })
        .to_string()
    }

    fn client_for(server: &Server) -> HttpProviderClient {
        let config = ProviderConfig {
            base_url: server.url(),
            api_key: None,
            timeout_secs: 5,
            requests_per_second: 100,
        };
        HttpProviderClient::new(&config, "sk-or-v1-test").unwrap()
    }

    fn request(model: ModelDescriptor) -> CompletionRequest {
        CompletionRequest::new(model, "You are a tester", "Say hi")
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-or-v1-test")
            .match_header("x-title", "Tribunal")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "openai/gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are a tester"},
                    {"role": "user", "content": "Say hi"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(success_body("hi"))
            .create_async()
            .await;

        let completion = client_for(&server)
            .complete(request(ModelDescriptor::new("openai/gpt-4o")))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(completion.text, "hi");
        assert_eq!(
            completion.usage,
            Some(TokenUsage {
                input_tokens: 20,
                output_tokens: 5
            })
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (401, "auth_error"),
            (403, "auth_error"),
            (429, "rate_limited"),
            (408, "timeout"),
            (504, "timeout"),
            (500, "server_error"),
            (502, "server_error"),
            (503, "unavailable"),
            (404, "unavailable"),
        ];

        for (status, kind) in cases {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("POST", "/chat/completions")
                .with_status(status)
                .with_body(r#"{"error": {"message": "nope"}}"#)
                .create_async()
                .await;

            let err = client_for(&server)
                .complete(request(ModelDescriptor::new("m")))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), kind, "status {status}");
        }
    }

    #[tokio::test]
    async fn test_json_mode_rejection_resends_as_text() {
        let mut server = Server::new_async().await;
        let rejected = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "response_format": {"type": "json_object"}
            })))
            .with_status(400)
            .with_body(r#"{"error": {"message": "response_format not supported"}}"#)
            .expect(1)
            .create_async()
            .await;
        let text_mode = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("Output MUST be valid JSON".to_string()))
            .with_status(200)
            .with_body(success_body(r#"{"ok": true}"#))
            .expect(1)
            .create_async()
            .await;

        let completion = client_for(&server)
            .complete(request(ModelDescriptor::new("m")).with_format(ResponseFormat::Json))
            .await
            .unwrap();

        rejected.assert_async().await;
        text_mode.assert_async().await;
        assert_eq!(completion.text, r#"{"ok": true}"#);
    }

    #[tokio::test]
    async fn test_text_mode_bad_request_is_not_resent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body("bad")
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server)
            .complete(request(ModelDescriptor::new("m")))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_vision_input_sent_as_data_url() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(
                r#""url":"data:image/jpeg;base64,QUJD""#.to_string(),
            ))
            .with_status(200)
            .with_body(success_body("seen"))
            .create_async()
            .await;

        let vision = ModelDescriptor::new("vision-model").with_vision(true);
        let req = request(vision).with_vision_inputs(vec![VisionInput {
            caption: "snapshot".to_string(),
            image: Snapshot::jpeg("QUJD"),
        }]);

        let completion = client_for(&server).complete(req).await.unwrap();
        mock.assert_async().await;
        assert_eq!(completion.text, "seen");
    }

    #[tokio::test]
    async fn test_in_band_error_is_mapped() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"error": {"message": "upstream overloaded", "code": 429}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .complete(request(ModelDescriptor::new("m")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(ref m) if m == "upstream overloaded"));
    }

    #[test]
    fn test_error_message_is_scrubbed() {
        let body = r#"{"error": {"message": "bad key sk-or-v1-abcdefghijklmnopqrstuv"}}"#;
        let message = error_message(body);
        assert!(!message.contains("abcdefghijklmnop"));
        assert!(message.starts_with("bad key"));
    }
}
