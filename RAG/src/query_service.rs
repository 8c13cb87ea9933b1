use crate::config::Config;
use crate::error::{RagError, Result};
use crate::models::*;
use crate::prompts;
use crate::traits::{ChatHistoryStore, DocumentStore, Embedder, LanguageModel, WebSearch};
use log::Level;
use std::sync::Arc;

const SUFFICIENCY_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub history_limit: usize,
    pub retrieval_limit: usize,
    pub web_search_max_results: usize,
    pub answer_temperature: f32,
    pub conversation_temperature: f32,
    pub debug_decisions: bool,
}

impl QuerySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            history_limit: config.chat_history_limit,
            retrieval_limit: config.similarity_search_limit,
            web_search_max_results: config.web_search_max_results,
            answer_temperature: config.retrieval_temperature,
            conversation_temperature: config.history_temperature,
            debug_decisions: config.debug_pipeline_decisions,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            history_limit: 5,
            retrieval_limit: 5,
            web_search_max_results: 3,
            answer_temperature: 0.2,
            conversation_temperature: 0.3,
            debug_decisions: true,
        }
    }
}

/// The retrieval-augmentation pipeline: history, retrieval, sufficiency gate,
/// optional web fallback, final answer, history append.
pub struct QueryService {
    history: Arc<dyn ChatHistoryStore>,
    documents: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    web_search: Arc<dyn WebSearch>,
    settings: QuerySettings,
}

impl QueryService {
    pub fn new(
        history: Arc<dyn ChatHistoryStore>,
        documents: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        web_search: Arc<dyn WebSearch>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            history,
            documents,
            embedder,
            llm,
            web_search,
            settings,
        }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub async fn answer(&self, query: &str, session_id: &str) -> Result<Answer> {
        let query = non_empty(query)?;

        let history = self.load_history(session_id).await;

        let query_embedding = self.embedder.embed(query).await?;

        let retrieved = self
            .documents
            .query_similar(&query_embedding, self.settings.retrieval_limit)
            .await?;
        self.decision(format!("retrieved {} chunks for session {}", retrieved.len(), session_id));

        let sufficiency = self.check_sufficiency(query, &retrieved).await;
        self.decision(format!("sufficiency verdict: {:?}", sufficiency));

        let web_results = if sufficiency.is_sufficient() {
            Vec::new()
        } else {
            self.search_web(query).await
        };
        let used_web_search = !web_results.is_empty();

        let prompt = prompts::build_answer_prompt(query, &history, &retrieved, &web_results);
        let text = self
            .llm
            .generate(&prompt, self.settings.answer_temperature)
            .await?;

        self.history.append(session_id, query, &text).await?;

        Ok(Answer {
            text,
            used_web_search,
            sufficiency,
            retrieved_chunks: retrieved,
        })
    }

    /// Conversation-only reply: no retrieval and no web search.
    pub async fn answer_simple(&self, message: &str, session_id: &str) -> Result<String> {
        let message = non_empty(message)?;
        let history = self.load_history(session_id).await;

        let prompt = prompts::build_conversation_prompt(message, &history);
        let text = self
            .llm
            .generate(&prompt, self.settings.conversation_temperature)
            .await?;

        self.history.append(session_id, message, &text).await?;
        Ok(text)
    }

    /// Raw vector search for inspecting what retrieval would return.
    pub async fn search_debug(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query = non_empty(query)?;
        let query_embedding = self.embedder.embed(query).await?;
        self.documents.query_similar(&query_embedding, k).await
    }

    async fn load_history(&self, session_id: &str) -> Vec<MessagePair> {
        match self
            .history
            .get(session_id, Some(self.settings.history_limit))
            .await
        {
            Ok(history) => history,
            Err(e) => {
                log::warn!("Could not load history for {}, continuing without: {}", session_id, e);
                Vec::new()
            }
        }
    }

    async fn check_sufficiency(&self, query: &str, retrieved: &[ScoredChunk]) -> Sufficiency {
        if retrieved.is_empty() {
            return Sufficiency::NoChunks;
        }

        let prompt = prompts::build_sufficiency_prompt(query, retrieved);
        match self.llm.generate(&prompt, SUFFICIENCY_TEMPERATURE).await {
            Ok(reply) => {
                let verdict = prompts::parse_sufficiency(&reply);
                if verdict == Sufficiency::Unclear {
                    log::warn!("Unparseable sufficiency reply, treating as insufficient: {:?}", reply);
                }
                verdict
            }
            Err(e) => {
                log::warn!("Sufficiency check failed, treating as insufficient: {}", e);
                Sufficiency::CheckFailed
            }
        }
    }

    /// Empty on failure: the answer then relies on local context only.
    async fn search_web(&self, query: &str) -> Vec<WebResult> {
        match self
            .web_search
            .search(query, self.settings.web_search_max_results)
            .await
        {
            Ok(results) => {
                self.decision(format!("web search returned {} results", results.len()));
                results
            }
            Err(e) => {
                log::warn!("Web search unavailable, answering from local context: {}", e);
                Vec::new()
            }
        }
    }

    fn decision(&self, message: String) {
        let level = if self.settings.debug_decisions {
            Level::Info
        } else {
            Level::Debug
        };
        log::log!(level, "[pipeline] {}", message);
    }
}

fn non_empty(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidInput("message must not be empty".to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_history::InMemoryChatHistory;
    use crate::document_processor::DocumentProcessor;
    use crate::document_store::InMemoryDocumentStore;
    use crate::testing::*;

    const VOCABULARY: [&str; 8] = [
        "zorbia", "capital", "river", "mountain", "population", "festival", "glimmer", "harbor",
    ];

    struct Harness {
        history: Arc<InMemoryChatHistory>,
        store: Arc<InMemoryDocumentStore>,
        embedder: Arc<KeywordEmbedder>,
        model: Arc<ScriptedModel>,
    }

    impl Harness {
        fn new(model: ScriptedModel) -> Self {
            Self {
                history: Arc::new(InMemoryChatHistory::new()),
                store: Arc::new(InMemoryDocumentStore::new(VOCABULARY.len())),
                embedder: Arc::new(KeywordEmbedder::new(&VOCABULARY)),
                model: Arc::new(model),
            }
        }

        fn service(&self, web_search: Arc<dyn WebSearch>) -> QueryService {
            self.service_with_embedder(self.embedder.clone(), web_search)
        }

        fn service_with_embedder(
            &self,
            embedder: Arc<dyn Embedder>,
            web_search: Arc<dyn WebSearch>,
        ) -> QueryService {
            QueryService::new(
                self.history.clone(),
                self.store.clone(),
                embedder,
                self.model.clone(),
                web_search,
                QuerySettings::default(),
            )
        }

        async fn ingest(&self, pages: &[&str], chunk_size: usize, overlap: usize) {
            let processor = DocumentProcessor::new(
                self.embedder.clone(),
                self.store.clone(),
                chunk_size,
                overlap,
            );
            let pages: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
            processor.ingest_pages(&pages, "zorbia.pdf").await.unwrap();
        }
    }

    fn web_result() -> WebResult {
        WebResult {
            title: "Zorbia travel guide".to_string(),
            url: "https://example.com/zorbia".to_string(),
            content: "The harbor festival happens every spring.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_chunks_skips_sufficiency_call() {
        let harness = Harness::new(ScriptedModel::new("YES", "from the web"));
        let web = Arc::new(StaticWebSearch::new(vec![web_result()]));
        let service = harness.service(web.clone());

        let answer = service.answer("When is the harbor festival?", "s").await.unwrap();

        assert_eq!(answer.sufficiency, Sufficiency::NoChunks);
        assert_eq!(harness.model.sufficiency_calls(), 0);
        assert_eq!(harness.model.answer_calls(), 1);
        assert_eq!(web.calls(), 1);
        assert!(answer.used_web_search);
        assert_eq!(answer.text, "from the web");
    }

    #[tokio::test]
    async fn test_web_search_failure_degrades_gracefully() {
        let harness = Harness::new(ScriptedModel::new("NO", "local only"));
        harness
            .ingest(&["The zorbia river runs past the mountain villages of the north."], 50, 5)
            .await;
        let web = Arc::new(FailingWebSearch::new());
        let service = harness.service(web.clone());

        let answer = service.answer("Where does the zorbia river run?", "s").await.unwrap();

        assert_eq!(web.calls(), 1);
        assert!(!answer.used_web_search);
        assert_eq!(answer.sufficiency, Sufficiency::Insufficient);
        assert_eq!(answer.text, "local only");
        let history = harness.history.get("s", None).await.unwrap();
        assert_eq!(
            history,
            vec![("Where does the zorbia river run?".to_string(), "local only".to_string())]
        );
    }

    #[tokio::test]
    async fn test_sufficient_chunks_skip_web_search() {
        let harness = Harness::new(ScriptedModel::new("Yes.", "answer"));
        harness
            .ingest(&["Glimmer is the capital of zorbia and sits beside the harbor."], 50, 5)
            .await;
        let web = Arc::new(StaticWebSearch::new(vec![web_result()]));
        let service = harness.service(web.clone());

        let answer = service.answer("What is the capital of zorbia?", "s").await.unwrap();

        assert_eq!(answer.sufficiency, Sufficiency::Sufficient);
        assert_eq!(web.calls(), 0);
        assert!(!answer.used_web_search);
        assert_eq!(harness.model.sufficiency_calls(), 1);
    }

    #[tokio::test]
    async fn test_unclear_or_failed_verdict_counts_as_insufficient() {
        for model in [
            ScriptedModel::new("I think the documents might help", "a"),
            ScriptedModel::failing_verdict("a"),
        ] {
            let harness = Harness::new(model);
            harness
                .ingest(&["Glimmer is the capital of zorbia and sits beside the harbor."], 50, 5)
                .await;
            let web = Arc::new(StaticWebSearch::new(vec![web_result()]));
            let service = harness.service(web.clone());

            let answer = service.answer("capital of zorbia?", "s").await.unwrap();

            assert!(!answer.sufficiency.is_sufficient());
            assert_eq!(web.calls(), 1);
            assert!(answer.used_web_search);
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_is_fatal_and_not_recorded() {
        let harness = Harness::new(ScriptedModel::new("YES", "never"));
        let service = harness.service_with_embedder(
            Arc::new(FailingEmbedder),
            Arc::new(StaticWebSearch::new(Vec::new())),
        );

        let err = service.answer("anything", "s").await.unwrap_err();

        assert!(matches!(err, RagError::Connection(_)));
        assert!(harness.model.prompts().is_empty());
        assert!(harness.history.info("s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_answer_failure_is_fatal_and_not_recorded() {
        let harness = Harness::new(ScriptedModel::failing_answer("NO"));
        let service = harness.service(Arc::new(FailingWebSearch::new()));

        let err = service.answer("capital of zorbia?", "s").await.unwrap_err();

        assert!(matches!(err, RagError::Api { .. }));
        assert!(harness.history.get("s", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let harness = Harness::new(ScriptedModel::new("YES", "a"));
        let service = harness.service(Arc::new(FailingWebSearch::new()));
        let err = service.answer("   ", "s").await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_history_is_windowed_into_prompt() {
        let harness = Harness::new(ScriptedModel::new("NO", "ok"));
        for i in 0..7 {
            harness
                .history
                .append("s", &format!("old question {}", i), &format!("old answer {}", i))
                .await
                .unwrap();
        }
        let service = harness.service(Arc::new(FailingWebSearch::new()));

        service.answer("capital of zorbia?", "s").await.unwrap();

        let prompt = harness.model.prompts().pop().unwrap();
        assert!(!prompt.contains("old question 1\n"));
        assert!(prompt.contains("User: old question 2"));
        assert!(prompt.contains("User: old question 6"));
        assert_eq!(harness.history.info("s").await.unwrap().unwrap().message_count, 8);
    }

    #[tokio::test]
    async fn test_end_to_end_two_page_document() {
        let harness = Harness::new(ScriptedModel::with_answer_fn("YES", |prompt| {
            let fact = prompt
                .lines()
                .find(|line| line.contains("capital of Zorbia is"))
                .unwrap_or("no information found");
            Ok(format!("According to the document: {}", fact))
        }));

        let page_one = "Zorbia is a small mountain nation. Its population is mostly rural \
                        and the river valleys are farmed every summer by local families.";
        let page_two = "The capital of Zorbia is Glimmer. Glimmer hosts a harbor festival \
                        each spring and is the seat of the national council.";
        harness.ingest(&[page_one, page_two], 22, 0).await;
        assert_eq!(harness.store.len().await, 2);

        let web = Arc::new(StaticWebSearch::new(vec![web_result()]));
        let service = harness.service(web.clone());

        let answer = service
            .answer("What is the capital of Zorbia?", "trip")
            .await
            .unwrap();

        let top = &answer.retrieved_chunks[0].chunk;
        assert_eq!(top.chunk_index, 1);
        assert_eq!(top.metadata.page_number, Some(2));
        assert!(answer.text.contains("capital of Zorbia is Glimmer"));
        assert!(!answer.used_web_search);
        assert_eq!(web.calls(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_uploaded_pdf() {
        let harness = Harness::new(ScriptedModel::with_answer_fn("YES", |prompt| {
            let fact = prompt
                .lines()
                .find(|line| line.contains("capital of Zorbia is"))
                .unwrap_or("no information found");
            Ok(format!("According to the document: {}", fact))
        }));
        let processor = DocumentProcessor::new(
            harness.embedder.clone(),
            harness.store.clone(),
            12,
            0,
        );
        let pdf = pdf_with_pages(&[
            "Zorbia is a small mountain nation whose population farms the river valleys.",
            "The capital of Zorbia is Glimmer, which hosts a harbor festival.",
        ]);
        let report = processor.ingest(pdf, "zorbia.pdf").await.unwrap();
        assert_eq!(report.chunks_created, 2);

        let web = Arc::new(StaticWebSearch::new(vec![web_result()]));
        let service = harness.service(web.clone());
        let answer = service
            .answer("What is the capital of Zorbia?", "trip")
            .await
            .unwrap();

        let top = &answer.retrieved_chunks[0].chunk;
        assert_eq!(top.metadata.page_number, Some(2));
        assert_eq!(top.metadata.source_file.as_deref(), Some("zorbia.pdf"));
        assert!(answer.text.contains("capital of Zorbia is Glimmer"));
        assert!(!answer.used_web_search);
        assert_eq!(web.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_simple_uses_history_without_retrieval() {
        let harness = Harness::new(ScriptedModel::new("YES", "hello again"));
        harness.history.append("s", "hi", "hello").await.unwrap();
        let web = Arc::new(StaticWebSearch::new(vec![web_result()]));
        let service = harness.service(web.clone());

        let reply = service.answer_simple("remember me?", "s").await.unwrap();

        assert_eq!(reply, "hello again");
        assert_eq!(harness.embedder.calls(), 0);
        assert_eq!(web.calls(), 0);
        assert!(harness.model.prompts()[0].contains("User: hi"));
        assert_eq!(harness.history.get("s", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_debug_returns_ranked_chunks() {
        let harness = Harness::new(ScriptedModel::new("YES", "unused"));
        harness
            .ingest(
                &["Glimmer is the capital of zorbia and the river flows through the harbor."],
                50,
                5,
            )
            .await;
        let service = harness.service(Arc::new(FailingWebSearch::new()));

        let results = service.search_debug("zorbia capital", 3).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.0);
        assert!(harness.model.prompts().is_empty());
    }
}
