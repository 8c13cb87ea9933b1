use crate::config::Config;
use crate::error::{RagError, Result};
use crate::models::WebResult;
use crate::traits::WebSearch;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    include_answer: bool,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

pub struct TavilyService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TavilyService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.tavily_api_key.clone(),
            base_url: config.tavily_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl WebSearch for TavilyService {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let request = TavilyRequest {
            query,
            max_results,
            include_answer: false,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Connection(format!("Tavily unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RagError::Api {
                service: "Tavily",
                status,
                message,
            });
        }

        let tavily_response: TavilyResponse = response.json().await?;
        Ok(into_web_results(tavily_response, max_results))
    }
}

fn into_web_results(response: TavilyResponse, max_results: usize) -> Vec<WebResult> {
    response
        .results
        .into_iter()
        .take(max_results)
        .map(|r| WebResult {
            title: r.title,
            url: r.url,
            content: r.content,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_are_capped() {
        let response: TavilyResponse = serde_json::from_str(
            r#"{
                "query": "rust",
                "answer": null,
                "results": [
                    {"title": "A", "url": "https://a.example", "content": "alpha", "score": 0.9},
                    {"title": "B", "url": "https://b.example", "content": "beta", "score": 0.8},
                    {"url": "https://c.example"}
                ]
            }"#,
        )
        .unwrap();
        let results = into_web_results(response, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "A");
        assert_eq!(results[1].content, "beta");
    }

    #[test]
    fn test_request_shape() {
        let request = TavilyRequest {
            query: "who maintains tokio",
            max_results: 3,
            include_answer: false,
            include_raw_content: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["query"], "who maintains tokio");
        assert_eq!(value["max_results"], 3);
    }
}
