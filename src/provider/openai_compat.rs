// src/provider/openai_compat.rs — Generic OpenAI-compatible provider

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use std::time::Duration;

use super::{ChatDelta, ChatRequest, DeltaStream, ModelProvider};
use crate::infra::errors::SkiffError;

/// Provider for any OpenAI-compatible endpoint (DeepSeek, Groq, SiliconFlow,
/// self-hosted gateways, …) configured as a third-party supplier.
pub struct OpenAiCompatProvider {
    supplier: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(supplier: String, base_url: String, api_key: String, timeout: Duration) -> Self {
        Self {
            supplier,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn messages_json(request: &ChatRequest) -> Vec<serde_json::Value> {
        request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect()
    }

    fn map_send_error(&self, e: reqwest::Error) -> SkiffError {
        if e.is_timeout() {
            SkiffError::UpstreamTimeout
        } else {
            SkiffError::upstream(&self.supplier, e.to_string())
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    async fn list_models(&self) -> Result<Vec<String>, SkiffError> {
        let resp = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SkiffError::upstream(
                &self.supplier,
                format!("{status}: {body}"),
            ));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SkiffError::upstream(&self.supplier, e.to_string()))?;

        Ok(body["data"]
            .as_array()
            .unwrap_or(&vec![])
            .iter()
            .filter_map(|m| m["id"].as_str().map(|s| s.to_string()))
            .collect())
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<DeltaStream, SkiffError> {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::messages_json(&request),
            "stream": true,
        });
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        let supplier = self.supplier.clone();

        let request_builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let mut es = request_builder
            .eventsource()
            .map_err(|e| SkiffError::upstream(&self.supplier, e.to_string()))?;

        // Drive the source until the stream is open so connection failures
        // surface as an envelope error instead of a broken stream.
        let open_deadline = tokio::time::timeout(self.timeout, es.next());
        let first = open_deadline
            .await
            .map_err(|_| SkiffError::UpstreamTimeout)?;
        let mut pending: Option<Event> = None;
        match first {
            Some(Ok(ev)) => {
                if !matches!(ev, Event::Open) {
                    pending = Some(ev);
                }
            }
            Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                return Err(SkiffError::upstream(&supplier, "stream ended before open"));
            }
            Some(Err(e)) => {
                return Err(SkiffError::upstream(&supplier, e.to_string()));
            }
        }

        let stream = async_stream::stream! {
            let mut next_event = pending.take().map(Ok);
            loop {
                let event = match next_event.take() {
                    Some(ev) => Some(ev),
                    None => es.next().await,
                };
                match event {
                    Some(Ok(Event::Open)) => {}
                    Some(Ok(Event::Message(msg))) => {
                        if msg.data == "[DONE]" {
                            break;
                        }
                        let parsed: serde_json::Value = match serde_json::from_str(&msg.data) {
                            Ok(v) => v,
                            Err(e) => {
                                yield Err(SkiffError::upstream(
                                    &supplier,
                                    format!("failed to parse SSE data: {e}"),
                                ));
                                break;
                            }
                        };

                        let delta = &parsed["choices"][0]["delta"];
                        let content = delta["content"].as_str().unwrap_or("");
                        let reasoning = delta["reasoning_content"].as_str().unwrap_or("");

                        // Some compat endpoints attach usage to the last chunk.
                        let stat = if parsed["usage"].is_object() {
                            let mut m = serde_json::Map::new();
                            for key in ["prompt_tokens", "completion_tokens", "total_tokens"] {
                                if let Some(v) = parsed["usage"].get(key) {
                                    if !v.is_null() {
                                        m.insert(key.to_string(), v.clone());
                                    }
                                }
                            }
                            Some(m)
                        } else {
                            None
                        };

                        if !content.is_empty() || !reasoning.is_empty() || stat.is_some() {
                            yield Ok(ChatDelta {
                                content: content.to_string(),
                                reasoning: reasoning.to_string(),
                                stat,
                            });
                        }
                    }
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => break,
                    Some(Err(e)) => {
                        yield Err(SkiffError::upstream(
                            &supplier,
                            format!("SSE stream error: {e}"),
                        ));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, SkiffError> {
        let body = serde_json::json!({
            "model": model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(SkiffError::upstream(
                &self.supplier,
                format!("{status}: {error_body}"),
            ));
        }

        let resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SkiffError::upstream(&self.supplier, e.to_string()))?;

        let mut out = Vec::with_capacity(texts.len());
        for item in resp["data"].as_array().unwrap_or(&vec![]) {
            let v: Vec<f32> = item["embedding"]
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .map(|x| x.as_f64().unwrap_or(0.0) as f32)
                .collect();
            out.push(v);
        }
        if out.len() != texts.len() {
            return Err(SkiffError::upstream(
                &self.supplier,
                format!("expected {} embeddings, got {}", texts.len(), out.len()),
            ));
        }
        Ok(out)
    }
}
