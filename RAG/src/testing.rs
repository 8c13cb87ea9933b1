//! Deterministic stand-ins for the external services.

use crate::error::{RagError, Result};
use crate::models::WebResult;
use crate::prompts::SUFFICIENCY_HEADER;
use crate::traits::{Embedder, LanguageModel, WebSearch};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Bag-of-words embedder over a fixed vocabulary: one dimension per word,
/// term-frequency weighted and L2 normalized.
pub struct KeywordEmbedder {
    vocabulary: HashMap<String, usize>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(words: &[&str]) -> Self {
        let vocabulary = words
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.to_lowercase(), idx))
            .collect();
        Self {
            vocabulary,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
            .filter(|word| !word.is_empty())
            .collect()
    }

    fn count_words(words: &[String]) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for word in words {
            *counts.entry(word.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn create_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.vocabulary.len()];
        let words = Self::tokenize(text);
        let total_words = words.len().max(1) as f32;

        for (word, count) in Self::count_words(&words) {
            if let Some(&idx) = self.vocabulary.get(&word) {
                embedding[idx] = count as f32 / total_words;
            }
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in embedding.iter_mut() {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.create_embedding(text))
    }

    fn dimensions(&self) -> usize {
        self.vocabulary.len()
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Connection("embedding service unreachable".to_string()))
    }

    fn dimensions(&self) -> usize {
        0
    }
}

type AnswerFn = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Language model that returns a fixed sufficiency verdict and computes
/// answers from the prompt. Every prompt is recorded.
pub struct ScriptedModel {
    /// `None` makes sufficiency calls fail.
    verdict: Option<String>,
    answer: AnswerFn,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(verdict: &str, answer: &str) -> Self {
        let answer = answer.to_string();
        Self::with_answer_fn(verdict, move |_| Ok(answer.clone()))
    }

    pub fn with_answer_fn<F>(verdict: &str, answer: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            verdict: Some(verdict.to_string()),
            answer: Box::new(answer),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Sufficiency calls fail; answers still work.
    pub fn failing_verdict(answer: &str) -> Self {
        let mut model = Self::new("", answer);
        model.verdict = None;
        model
    }

    /// Every answer call fails.
    pub fn failing_answer(verdict: &str) -> Self {
        Self::with_answer_fn(verdict, |_| {
            Err(RagError::Api {
                service: "scripted",
                status: 500,
                message: "generation failed".to_string(),
            })
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn sufficiency_calls(&self) -> usize {
        self.prompts()
            .iter()
            .filter(|p| p.starts_with(SUFFICIENCY_HEADER))
            .count()
    }

    pub fn answer_calls(&self) -> usize {
        self.prompts().len() - self.sufficiency_calls()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if prompt.starts_with(SUFFICIENCY_HEADER) {
            match &self.verdict {
                Some(verdict) => Ok(verdict.clone()),
                None => Err(RagError::Api {
                    service: "scripted",
                    status: 503,
                    message: "verdict unavailable".to_string(),
                }),
            }
        } else {
            (self.answer)(prompt)
        }
    }
}

/// Returns the same results for every query.
pub struct StaticWebSearch {
    results: Vec<WebResult>,
    calls: AtomicUsize,
}

impl StaticWebSearch {
    pub fn new(results: Vec<WebResult>) -> Self {
        Self {
            results,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for StaticWebSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}

#[derive(Default)]
pub struct FailingWebSearch {
    calls: AtomicUsize,
}

impl FailingWebSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for FailingWebSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<WebResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagError::Connection("web search unreachable".to_string()))
    }
}

/// A minimal PDF with one line of Courier text per page.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content.encode().expect("content encodes");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("in-memory PDF writes");
    bytes
}
