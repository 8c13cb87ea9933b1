use crate::error::{RagError, Result};
use crate::models::*;
use crate::traits::DocumentStore;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::{Collection, Database};
use rayon::prelude::*;
use tokio::sync::RwLock;

/// Atlas rejects `numCandidates` above this.
pub const MAX_NUM_CANDIDATES: usize = 10_000;

/// Chunks in an Atlas collection carrying a `$vectorSearch` index.
pub struct MongoDocumentStore {
    database: Database,
    collection: Collection<Document>,
    index_name: String,
    embedding_field: String,
}

impl MongoDocumentStore {
    pub fn new(
        database: Database,
        collection_name: &str,
        index_name: &str,
        embedding_field: &str,
    ) -> Self {
        let collection = database.collection::<Document>(collection_name);
        Self {
            database,
            collection,
            index_name: index_name.to_string(),
            embedding_field: embedding_field.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn query_similar(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut cursor = self
            .collection
            .aggregate(search_pipeline(
                &self.index_name,
                &self.embedding_field,
                embedding,
                k,
            ))
            .await?;

        let mut results = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            results.push(scored_chunk_from_row(document)?);
        }

        log::info!("Vector search returned {} chunks", results.len());
        Ok(results)
    }

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let documents = chunks
            .iter()
            .map(|chunk| chunk_document(chunk, &self.embedding_field))
            .collect::<Result<Vec<_>>>()?;
        let result = self.collection.insert_many(documents).await?;
        Ok(result.inserted_ids.len())
    }

    async fn ping(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

/// Stores the vector under the field the search index is defined on.
fn chunk_document(chunk: &DocumentChunk, embedding_field: &str) -> Result<Document> {
    let mut document = bson::to_document(chunk)?;
    if embedding_field != "embedding" {
        if let Some(embedding) = document.remove("embedding") {
            document.insert(embedding_field, embedding);
        }
    }
    Ok(document)
}

/// Decodes one `$vectorSearch` result row.
fn scored_chunk_from_row(mut row: Document) -> Result<ScoredChunk> {
    let score = row.get_f64("score").unwrap_or(0.0) as f32;
    row.remove("score");
    let chunk: DocumentChunk = bson::from_document(row)?;
    Ok(ScoredChunk { chunk, score })
}

/// `$vectorSearch` aggregation returning chunks with their score and without
/// the embedding field.
fn search_pipeline(
    index_name: &str,
    embedding_field: &str,
    embedding: &[f32],
    k: usize,
) -> Vec<Document> {
    let query_vector: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
    let num_candidates = k.saturating_mul(2).min(MAX_NUM_CANDIDATES);
    let limit = k.min(num_candidates);
    vec![
        doc! {
            "$vectorSearch": {
                "index": index_name,
                "path": embedding_field,
                "queryVector": query_vector,
                "numCandidates": num_candidates as i64,
                "limit": limit as i64,
            }
        },
        doc! { "$set": { "score": { "$meta": "vectorSearchScore" } } },
        doc! { "$project": { "_id": 0, (embedding_field): 0 } },
    ]
}

/// Process-local chunk store ranked by cosine similarity.
pub struct InMemoryDocumentStore {
    dimensions: usize,
    chunks: RwLock<Vec<DocumentChunk>>,
}

impl InMemoryDocumentStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            chunks: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query_similar(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if embedding.len() != self.dimensions {
            return Err(RagError::InvalidInput(format!(
                "query embedding has {} dimensions, store expects {}",
                embedding.len(),
                self.dimensions
            )));
        }

        let chunks = self.chunks.read().await;
        let mut chunk_scores: Vec<(usize, f32)> = chunks
            .par_iter()
            .enumerate()
            .map(|(idx, chunk)| (idx, calculate_similarity(embedding, &chunk.embedding)))
            .collect();

        // Sort by similarity score (highest first)
        chunk_scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<ScoredChunk> = chunk_scores
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredChunk {
                chunk: chunks[idx].clone(),
                score,
            })
            .collect();

        log::info!("Found {} relevant chunks", results.len());
        Ok(results)
    }

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize> {
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != self.dimensions) {
            return Err(RagError::InvalidInput(format!(
                "chunk {} of {} has {} dimensions, store expects {}",
                bad.chunk_index,
                bad.document_id,
                bad.embedding.len(),
                self.dimensions
            )));
        }

        let count = chunks.len();
        self.chunks.write().await.extend(chunks);
        Ok(count)
    }
}

/// Cosine similarity; zero for empty, mismatched or zero-norm vectors.
pub fn calculate_similarity(embedding1: &[f32], embedding2: &[f32]) -> f32 {
    if embedding1.len() != embedding2.len() || embedding1.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = embedding1
        .iter()
        .zip(embedding2.iter())
        .map(|(a, b)| a * b)
        .sum();

    let norm1: f32 = embedding1.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm2: f32 = embedding2.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm1 == 0.0 || norm2 == 0.0 {
        0.0
    } else {
        dot_product / (norm1 * norm2)
    }
}
