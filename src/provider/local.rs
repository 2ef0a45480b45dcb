// src/provider/local.rs — Managed local runtime provider (ollama-compatible)

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

use super::{ChatDelta, ChatRequest, DeltaStream, ModelProvider};
use crate::infra::errors::SkiffError;

pub struct LocalProvider {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl LocalProvider {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url,
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
            SkiffError::upstream("local", e.to_string())
        }
    }
}

/// Keys copied off the terminal NDJSON message into the turn's stat map.
const STAT_KEYS: &[&str] = &[
    "total_duration",
    "load_duration",
    "prompt_eval_count",
    "prompt_eval_duration",
    "eval_count",
    "eval_duration",
];

#[async_trait]
impl ModelProvider for LocalProvider {
    async fn list_models(&self) -> Result<Vec<String>, SkiffError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map_err(|e| SkiffError::upstream("local", format!("cannot reach runtime: {e}")))?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SkiffError::upstream("local", format!("invalid runtime response: {e}")))?;

        Ok(body["models"]
            .as_array()
            .unwrap_or(&vec![])
            .iter()
            .filter_map(|m| m["name"].as_str().map(|s| s.to_string()))
            .collect())
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<DeltaStream, SkiffError> {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::messages_json(&request),
            "stream": true,
        });
        if let Some(temp) = request.temperature {
            body["options"] = serde_json::json!({ "temperature": temp });
        }

        let send = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| SkiffError::UpstreamTimeout)?
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SkiffError::upstream("local", error_body));
        }

        // The runtime streams NDJSON: one JSON object per line, the final
        // line carries "done":true plus eval statistics.
        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut byte_stream = std::pin::pin!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(SkiffError::upstream("local", format!("stream read error: {e}")));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim().to_string();
                    buffer = buffer[newline_pos + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    let parsed: serde_json::Value = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(e) => {
                            yield Err(SkiffError::upstream(
                                "local",
                                format!("failed to parse NDJSON: {e}"),
                            ));
                            break;
                        }
                    };

                    if parsed["done"].as_bool().unwrap_or(false) {
                        let mut stat = serde_json::Map::new();
                        for key in STAT_KEYS {
                            if let Some(v) = parsed.get(*key) {
                                if !v.is_null() {
                                    stat.insert(key.to_string(), v.clone());
                                }
                            }
                        }
                        yield Ok(ChatDelta {
                            stat: Some(stat),
                            ..Default::default()
                        });
                        break;
                    }

                    let content = parsed["message"]["content"].as_str().unwrap_or("");
                    let reasoning = parsed["message"]["thinking"].as_str().unwrap_or("");
                    if !content.is_empty() || !reasoning.is_empty() {
                        yield Ok(ChatDelta {
                            content: content.to_string(),
                            reasoning: reasoning.to_string(),
                            stat: None,
                        });
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, SkiffError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({
                "model": model,
                "prompt": text,
            });
            let response = self
                .client
                .post(format!("{}/api/embeddings", self.base_url))
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                return Err(SkiffError::upstream("local", error_body));
            }

            let resp: serde_json::Value = response
                .json()
                .await
                .map_err(|e| SkiffError::upstream("local", e.to_string()))?;

            let embedding: Vec<f32> = resp["embedding"]
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            if embedding.is_empty() {
                return Err(SkiffError::upstream("local", "empty embedding returned"));
            }
            results.push(embedding);
        }
        Ok(results)
    }
}
