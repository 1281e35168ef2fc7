//! OpenAI-compatible HTTP client
//!
//! Implements both boundary traits over the `/chat/completions` and
//! `/embeddings` endpoints. Any service speaking the same wire shape works
//! by pointing `llm.base_url` at it.

use super::{ChunkSender, EmbeddingClient, GenerationClient, GenerationRequest, LlmError};
use crate::config::LlmConfig;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

pub struct OpenAiClient {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            api_key,
            client,
        }
    }

    fn chat_payload(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "stream": stream,
            "messages": [
                { "role": "system", "content": request.role_instructions },
                { "role": "user", "content": request.input },
            ],
        })
    }

    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> super::Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthenticationFailed(text),
                429 => LlmError::RateLimitExceeded,
                _ => LlmError::InvalidRequest(text),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> super::Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let payload = self.chat_payload(request, false);

        let response = self.post(&url, &payload).await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::ParseError("No content in response".to_string()))?;

        if content.is_empty() {
            return Err(LlmError::ParseError("Empty content".to_string()));
        }

        Ok(content.to_string())
    }

    async fn generate_streamed(
        &self,
        request: &GenerationRequest,
        chunks: &ChunkSender,
    ) -> super::Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let payload = self.chat_payload(request, true);

        let response = self.post(&url, &payload).await?;

        // The streamed body is server-sent events: `data: {json}` lines,
        // terminated by `data: [DONE]`. Deltas are emitted to the chunk
        // channel for observability; the accumulated text is the result.
        let mut full_content = String::new();
        let mut buffer = String::new();
        let mut body = response.bytes_stream();

        while let Some(piece) = body.next().await {
            let piece = piece.map_err(|e| LlmError::NetworkError(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&piece));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();

                if data == "[DONE]" {
                    continue;
                }

                let event: serde_json::Value = match serde_json::from_str(data) {
                    Ok(v) => v,
                    Err(_) => continue, // partial/keepalive line
                };

                if let Some(delta) = event
                    .get("choices")
                    .and_then(|c| c.as_array())
                    .and_then(|c| c.first())
                    .and_then(|choice| choice.get("delta"))
                    .and_then(|d| d.get("content"))
                    .and_then(|c| c.as_str())
                {
                    full_content.push_str(delta);
                    let _ = chunks.send(delta.to_string());
                }
            }
        }

        if full_content.is_empty() {
            return Err(LlmError::ParseError("Empty streamed content".to_string()));
        }

        Ok(full_content)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, text: &str) -> super::Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.base_url);

        // Newlines degrade embedding quality on these endpoints
        let input = text.replace('\n', " ");

        let payload = json!({
            "model": self.config.embedding_model,
            "input": [input],
        });

        let response = self.post(&url, &payload).await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let embedding = data
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| LlmError::ParseError("No embedding in response".to_string()))?;

        Ok(embedding
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_returns_message_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "A caption draft." } }]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri()), "sk-test".to_string());
        let text = client
            .generate(&GenerationRequest::new("You write captions.", "Write one."))
            .await
            .unwrap();

        assert_eq!(text, "A caption draft.");
    }

    #[tokio::test]
    async fn test_generate_maps_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri()), "sk-bad".to_string());
        let err = client
            .generate(&GenerationRequest::new("r", "i"))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_generate_maps_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri()), "sk-test".to_string());
        let err = client
            .generate(&GenerationRequest::new("r", "i"))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_embed_parses_vector() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [0.25, -0.5, 1.0] }]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri()), "sk-test".to_string());
        let vector = client.embed("a caption\nwith newline").await.unwrap();

        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_streamed_accumulates_sse_deltas() {
        let server = MockServer::start().await;

        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"world\"}}]}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri()), "sk-test".to_string());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let text = client
            .generate_streamed(&GenerationRequest::new("r", "i"), &tx)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(text, "Hello world");

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        assert_eq!(chunks, vec!["Hello ", "world"]);
    }
}
