//! OpenAI chat-completions engine.
//!
//! Calls `{base_url}/chat/completions` once per exchange. No retries are
//! attempted; failures are reported to the caller with the upstream payload.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationEngine, GenerationError, GenerationParams, GenerationRequest};
use crate::transcript::Turn;

pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<PromptRef<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct PromptRef<'a> {
    id: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if it carries any non-blank content.
    fn into_reply(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|text| !text.trim().is_empty())
    }
}

/// Engine backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEngine {
    client: Client,
    api_key: String,
    base_url: String,
    params: GenerationParams,
}

impl OpenAiEngine {
    /// Create an engine using the public OpenAI endpoint.
    pub fn new(client: Client, api_key: impl Into<String>) -> Result<Self, GenerationError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenerationError::Config(
                "OPENAI_API_KEY is required".to_string(),
            ));
        }
        Ok(Self {
            client,
            api_key,
            base_url: OPENAI_API_BASE_URL.to_string(),
            params: GenerationParams::default(),
        })
    }

    /// Point the engine at a different API root (proxy, compatible server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl GenerationEngine for OpenAiEngine {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<Option<String>, GenerationError> {
        let body = ChatCompletionRequest {
            model: &self.params.model,
            messages: request.transcript.turns(),
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            frequency_penalty: self.params.frequency_penalty,
            presence_penalty: self.params.presence_penalty,
            response_format: ResponseFormat { kind: "text" },
            prompt: request.prompt_id.map(|id| PromptRef { id }),
        };

        debug!(
            model = %self.params.model,
            turns = request.transcript.len(),
            "requesting chat completion"
        );

        let resp = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        Ok(data.into_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "created": 1234567890,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    fn engine(server: &MockServer) -> OpenAiEngine {
        OpenAiEngine::new(Client::new(), "sk-test")
            .unwrap()
            .with_base_url(server.uri())
    }

    fn transcript() -> Transcript {
        let mut t = Transcript::new("You are a sales assistant.");
        t.push_user("Hi there");
        t
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let err = OpenAiEngine::new(Client::new(), "  ").unwrap_err();
        assert!(matches!(err, GenerationError::Config(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let e = OpenAiEngine::new(Client::new(), "k")
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(e.completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn reply_extraction_handles_missing_parts() {
        let none: ChatCompletionResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(none.into_reply(), None);

        let null_content: ChatCompletionResponse =
            serde_json::from_value(completion(serde_json::Value::Null)).unwrap();
        assert_eq!(null_content.into_reply(), None);

        let empty: ChatCompletionResponse =
            serde_json::from_value(completion(serde_json::json!(""))).unwrap();
        assert_eq!(empty.into_reply(), None);

        let ok: ChatCompletionResponse =
            serde_json::from_value(completion(serde_json::json!("Hello!"))).unwrap();
        assert_eq!(ok.into_reply().as_deref(), Some("Hello!"));
    }

    #[tokio::test]
    async fn sends_transcript_and_fixed_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 200,
                "temperature": 1.0,
                "top_p": 1.0,
                "frequency_penalty": 0.0,
                "presence_penalty": 0.0,
                "response_format": {"type": "text"},
                "messages": [
                    {"role": "system", "content": "You are a sales assistant."},
                    {"role": "user", "content": "Hi there"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                serde_json::json!("Hello! How can I help?"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let t = transcript();
        let reply = engine(&server)
            .generate(GenerationRequest {
                transcript: &t,
                prompt_id: None,
            })
            .await
            .unwrap();

        assert_eq!(reply.as_deref(), Some("Hello! How can I help?"));
    }

    #[tokio::test]
    async fn prompt_id_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"prompt": {"id": "pmpt_123"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                serde_json::json!("ok"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let t = transcript();
        let reply = engine(&server)
            .generate(GenerationRequest {
                transcript: &t,
                prompt_id: Some("pmpt_123"),
            })
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn upstream_error_body_is_preserved() {
        let server = MockServer::start().await;
        let upstream = serde_json::json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        });
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(upstream.clone()))
            .mount(&server)
            .await;

        let t = transcript();
        let err = engine(&server)
            .generate(GenerationRequest {
                transcript: &t,
                prompt_id: None,
            })
            .await
            .unwrap_err();

        match err {
            GenerationError::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, upstream);
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_body_becomes_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let t = transcript();
        let err = engine(&server)
            .generate(GenerationRequest {
                transcript: &t,
                prompt_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.details(), serde_json::json!("Bad Gateway"));
    }

    #[tokio::test]
    async fn empty_completion_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "x", "choices": []})),
            )
            .mount(&server)
            .await;

        let t = transcript();
        let reply = engine(&server)
            .generate(GenerationRequest {
                transcript: &t,
                prompt_id: None,
            })
            .await
            .unwrap();
        assert_eq!(reply, None);
    }
}
