use crate::error::{RagError, Result};
use crate::models::*;
use crate::traits::{DocumentStore, Embedder};
use chrono::Utc;
use regex::Regex;
use std::ops::Range;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

/// Below this many characters of extracted text a PDF is treated as empty.
const MIN_TEXT_CHARS: usize = 50;

static RE_SPECIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,!?;:()\-]").expect("valid regex"));
static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A chunk before it has been embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub content: String,
    pub page_number: Option<u32>,
    pub word_count: u32,
}

/// Turns uploaded PDFs into embedded chunks in the document store.
pub struct DocumentProcessor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentProcessor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn DocumentStore>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            chunk_size,
            chunk_overlap,
        }
    }

    pub async fn ingest(&self, file_bytes: Vec<u8>, filename: &str) -> Result<IngestReport> {
        log::info!("Processing PDF: {} ({} bytes)", filename, file_bytes.len());
        let pages = extract_pages(file_bytes).await?;
        self.ingest_pages(&pages, filename).await
    }

    /// Chunks, embeds and stores already-extracted page texts. Chunks written
    /// before a failing insert stay written.
    pub async fn ingest_pages(&self, pages: &[String], filename: &str) -> Result<IngestReport> {
        let cleaned: Vec<String> = pages.iter().map(|p| clean_text(p)).collect();
        let text_chars: usize = cleaned.iter().map(|p| p.chars().count()).sum();
        if text_chars < MIN_TEXT_CHARS {
            return Err(RagError::InvalidInput(format!(
                "no substantial text found in {}",
                filename
            )));
        }
        let total_words: usize = cleaned.iter().map(|p| p.split_whitespace().count()).sum();
        let drafts = self.chunk_pages(&cleaned);

        let texts: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != drafts.len() {
            return Err(RagError::Connection(format!(
                "embedding service returned {} vectors for {} chunks",
                embeddings.len(),
                drafts.len()
            )));
        }

        let document_id = Uuid::new_v4().to_string();
        let upload_timestamp = Utc::now();
        let chunks: Vec<DocumentChunk> = drafts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(idx, (draft, embedding))| DocumentChunk {
                document_id: document_id.clone(),
                content: draft.content,
                chunk_index: idx as u32,
                embedding,
                metadata: ChunkMetadata {
                    source_file: Some(filename.to_string()),
                    page_number: draft.page_number,
                    word_count: draft.word_count,
                    upload_timestamp,
                    document_type: "pdf".to_string(),
                },
            })
            .collect();

        let chunks_created = self.store.insert_chunks(chunks).await?;
        log::info!(
            "Stored {} chunks for {} (document {})",
            chunks_created,
            filename,
            document_id
        );

        Ok(IngestReport {
            document_id,
            filename: filename.to_string(),
            chunks_created,
            total_words,
        })
    }

    /// Overlapping word windows across all pages; each chunk is tagged with
    /// the page its first word came from.
    pub fn create_chunks(&self, pages: &[String]) -> Vec<ChunkDraft> {
        let cleaned: Vec<String> = pages.iter().map(|p| clean_text(p)).collect();
        self.chunk_pages(&cleaned)
    }

    fn chunk_pages(&self, cleaned_pages: &[String]) -> Vec<ChunkDraft> {
        let words: Vec<(&str, u32)> = cleaned_pages
            .iter()
            .enumerate()
            .flat_map(|(page_idx, text)| {
                text.split_whitespace()
                    .map(move |word| (word, page_idx as u32 + 1))
            })
            .collect();

        let chunks: Vec<ChunkDraft> = chunk_ranges(words.len(), self.chunk_size, self.chunk_overlap)
            .into_iter()
            .map(|range| {
                let window = &words[range];
                ChunkDraft {
                    content: window.iter().map(|(w, _)| *w).collect::<Vec<_>>().join(" "),
                    page_number: window.first().map(|(_, page)| *page),
                    word_count: window.len() as u32,
                }
            })
            .collect();

        log::info!("Created {} chunks", chunks.len());
        chunks
    }
}

/// Extracts the text of each page, in page order.
pub async fn extract_pages(file_bytes: Vec<u8>) -> Result<Vec<String>> {
    if !file_bytes.starts_with(b"%PDF") {
        return Err(RagError::InvalidInput("file is not a PDF".to_string()));
    }

    // The extractor is CPU-bound and may panic on malformed files.
    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&file_bytes)
    })
    .await
    .map_err(|e| RagError::Pdf(format!("extraction aborted: {}", e)))?
    .map_err(|e| RagError::Pdf(format!("error extracting text from PDF: {}", e)))?;

    log::debug!("Extracted {} pages", pages.len());
    Ok(pages)
}

pub fn clean_text(text: &str) -> String {
    let cleaned = RE_SPECIAL.replace_all(text, " ");
    let cleaned = RE_WHITESPACE.replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// Word ranges of fixed-size windows advancing by `chunk_size - overlap`,
/// stopping at the first window that reaches the end. That gives
/// `ceil((len - overlap) / (chunk_size - overlap))` windows, one when
/// `len <= chunk_size` and none for empty input.
pub fn chunk_ranges(len: usize, chunk_size: usize, overlap: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    let stride = chunk_size.saturating_sub(overlap).max(1);

    let mut ranges = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(len);
        ranges.push(start..end);
        if end == len {
            break;
        }
        start += stride;
    }
    ranges
}

/// Splits whitespace-separated text into overlapping word chunks.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    chunk_ranges(words.len(), chunk_size, overlap)
        .into_iter()
        .map(|range| words[range].join(" "))
        .collect()
}
