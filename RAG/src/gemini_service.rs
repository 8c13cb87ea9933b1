use crate::config::Config;
use crate::error::{RagError, Result};
use crate::models::*;
use crate::traits::{Embedder, LanguageModel};
use async_trait::async_trait;
use reqwest::Client;

const MAX_OUTPUT_TOKENS: u32 = 1000;

/// Gemini REST client, used both for text generation and embeddings.
pub struct GeminiService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
    embedding_dimensions: usize,
}

impl GeminiService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            embedding_model: config.embedding_model.clone(),
            embedding_dimensions: config.embedding_dimensions,
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    fn embed_request(&self, text: &str) -> GeminiEmbedRequest {
        GeminiEmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        }
    }

    async fn post<B: serde::Serialize>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::Connection(format!("Gemini unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RagError::Api {
                service: "Gemini",
                status,
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for GeminiService {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            }),
        };

        let url = self.endpoint(&self.model, "generateContent");
        let gemini_response: GeminiResponse = self.post(&url, &request).await?.json().await?;

        Ok(first_candidate_text(gemini_response))
    }
}

#[async_trait]
impl Embedder for GeminiService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.endpoint(&self.embedding_model, "embedContent");
        let response: GeminiEmbedResponse = self
            .post(&url, &self.embed_request(text))
            .await?
            .json()
            .await?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = GeminiBatchEmbedRequest {
            requests: texts.iter().map(|t| self.embed_request(t)).collect(),
        };
        let url = self.endpoint(&self.embedding_model, "batchEmbedContents");
        let response: GeminiBatchEmbedResponse =
            self.post(&url, &request).await?.json().await?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::Api {
                service: "Gemini",
                status: 200,
                message: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            });
        }

        log::debug!("Embedded {} texts", texts.len());
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }
}

fn first_candidate_text(response: GeminiResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .unwrap_or_else(|| "No response generated".to_string())
}
