//! Online question answering: reformulate → retrieve → synthesize.
//!
//! [`ChatPipeline`] is built once and shared by reference across requests.
//! Construction fails with a typed error when credentials or the index are
//! missing, so callers can refuse to serve before the first request.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use doki_shared::{AppConfig, ChatRequest, ChatResponse, ChatTurn, DokiError, Result, validate_api_key};
use doki_storage::VectorIndex;

use crate::embedding::{Embedder, build_embedder};
use crate::llm::{LanguageModel, build_llm};
use crate::reformulate::reformulate;
use crate::retriever::Retriever;
use crate::synthesize::synthesize;

/// Returned when the model produces an empty answer.
pub const FALLBACK_ANSWER: &str = "I couldn't find an answer in the provided documentation.";

/// An answer and the sources of the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub answer: String,
    /// Distinct source identifiers, best match first.
    pub sources: Vec<String>,
    /// Question actually used for retrieval.
    pub standalone_question: String,
}

/// Shared, read-only question answering pipeline.
#[derive(Clone)]
pub struct ChatPipeline {
    retriever: Retriever,
    llm: Arc<dyn LanguageModel>,
}

impl ChatPipeline {
    pub fn new(retriever: Retriever, llm: Arc<dyn LanguageModel>) -> Self {
        Self { retriever, llm }
    }

    /// Build providers from `config` and open the index read-only.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        validate_api_key(config)?;
        let embedder = build_embedder(&config.embedding)?;
        let llm = build_llm(&config.llm)?;
        Self::open_with(&config.paths.index_dir, config.retrieval.k, embedder, llm).await
    }

    /// Open the index under `index_dir` and pair it with the given models.
    ///
    /// Rejects an index that was never fully built or was built with a
    /// different embedding model.
    pub async fn open_with(
        index_dir: &Path,
        k: usize,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let index = VectorIndex::open_readonly(index_dir).await?;
        let stats = index.stats().await?;
        if stats.built_at.is_none() {
            return Err(DokiError::index_unavailable(
                index.path(),
                "index has no completed build; run `doki ingest` first",
            ));
        }
        if let Some(recorded) = stats.model_id.as_deref() {
            if recorded != embedder.model_id() {
                return Err(DokiError::config(format!(
                    "index was built with embedding model `{recorded}` but `{}` is configured; \
                     re-run `doki ingest` or change [embedding]",
                    embedder.model_id()
                )));
            }
        }

        info!(
            records = stats.record_count,
            model = embedder.model_id(),
            llm = llm.model_id(),
            "chat pipeline ready"
        );
        Ok(Self::new(Retriever::new(Arc::new(index), embedder, k), llm))
    }

    /// Answer `question` given the prior conversation.
    #[instrument(skip_all, fields(turns = history.len()))]
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<Answer> {
        let standalone = reformulate(self.llm.as_ref(), question, history).await?;
        let results = self.retriever.retrieve_default(&standalone).await?;
        let answer = synthesize(self.llm.as_ref(), &standalone, &results, history).await?;

        let mut sources: Vec<String> = Vec::new();
        for record in &results {
            if !sources.contains(&record.metadata.source) {
                sources.push(record.metadata.source.clone());
            }
        }

        Ok(Answer {
            answer: if answer.is_empty() {
                FALLBACK_ANSWER.to_string()
            } else {
                answer
            },
            sources,
            standalone_question: standalone,
        })
    }

    /// Chat endpoint: `{question, chat_history?}` → `{answer}`.
    pub async fn handle(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let history = request.chat_history.as_deref().unwrap_or_default();
        let answer = self.answer(&request.question, history).await?;
        Ok(ChatResponse {
            answer: answer.answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkConfig;
    use crate::embedding::HashingEmbedder;
    use crate::ingest::{IngestConfig, SilentProgress, ingest};
    use crate::testing::{EchoLlm, NOT_FOUND_ANSWER, ScriptedLlm};
    use doki_extract::ExtractOptions;
    use doki_storage::ContentStore;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("doki_chat_{}", Uuid::now_v7()))
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(384).unwrap())
    }

    /// Crawled-store fixture: one page per `(key, html)`, ingested with the hashing embedder.
    async fn build_kb(pages: &[(&str, &str)]) -> PathBuf {
        let root = temp_root();
        let config = IngestConfig {
            content_dir: root.join("scraped_html"),
            index_dir: root.join("vector_index"),
            chunk: ChunkConfig::new(1000, 200).unwrap(),
            extract: ExtractOptions::default(),
            batch_size: 8,
        };
        let store = ContentStore::new(&config.content_dir);
        for (key, html) in pages {
            store.save(key, html.as_bytes()).unwrap();
        }
        ingest(&config, &HashingEmbedder::new(384).unwrap(), &SilentProgress)
            .await
            .unwrap();
        config.index_dir
    }

    const RAMANSPY_PAGE: &str = "<html><body><nav>Docs</nav><main>\
        <p>RamanSpy supports baseline correction and denoising.</p></main></body></html>";
    const FORMATS_PAGE: &str = "<html><body><main>\
        <p>RamanSpy loads WITec, Renishaw and Ocean Insight file formats.</p></main></body></html>";

    #[tokio::test]
    async fn answers_from_retrieved_context() {
        let index_dir = build_kb(&[("preprocessing.html", RAMANSPY_PAGE)]).await;
        let pipeline = ChatPipeline::open_with(&index_dir, 5, embedder(), Arc::new(EchoLlm))
            .await
            .unwrap();

        let answer = pipeline
            .answer("What preprocessing does RamanSpy support?", &[])
            .await
            .unwrap();
        assert!(answer.answer.contains("baseline correction"));
        assert!(answer.answer.contains("denoising"));
        assert_eq!(answer.sources, vec!["preprocessing.html".to_string()]);
    }

    #[tokio::test]
    async fn empty_index_answers_not_found() {
        let dir = temp_root().join("vector_index");
        let index = Arc::new(VectorIndex::open(&dir).await.unwrap());
        let pipeline = ChatPipeline::new(Retriever::new(index, embedder(), 5), Arc::new(EchoLlm));

        let answer = pipeline.answer("What is the meaning of life?", &[]).await.unwrap();
        assert_eq!(answer.answer, NOT_FOUND_ANSWER);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn follow_up_is_rewritten_before_retrieval() {
        let index_dir = build_kb(&[
            ("preprocessing.html", RAMANSPY_PAGE),
            ("formats.html", FORMATS_PAGE),
        ])
        .await;
        let llm = Arc::new(ScriptedLlm::new([
            "What file formats does RamanSpy support?",
            "WITec, Renishaw and Ocean Insight.",
        ]));
        let pipeline = ChatPipeline::open_with(&index_dir, 1, embedder(), llm.clone())
            .await
            .unwrap();

        let history = [
            ChatTurn::human("What is RamanSpy?"),
            ChatTurn::ai("RamanSpy is a Python package for Raman spectroscopy."),
        ];
        let answer = pipeline
            .answer("What file formats does it support?", &history)
            .await
            .unwrap();

        assert_eq!(answer.standalone_question, "What file formats does RamanSpy support?");
        assert_eq!(answer.sources, vec!["formats.html".to_string()]);

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        let prompt = &calls[1][0].content;
        assert!(prompt.contains("Question: What file formats does RamanSpy support?"));
        assert!(prompt.contains("Renishaw"));
        assert!(prompt.contains("Human: What is RamanSpy?"));
    }

    #[tokio::test]
    async fn absent_and_empty_history_match() {
        let index_dir = build_kb(&[("preprocessing.html", RAMANSPY_PAGE)]).await;
        let pipeline = ChatPipeline::open_with(&index_dir, 5, embedder(), Arc::new(EchoLlm))
            .await
            .unwrap();

        let without = pipeline
            .handle(&ChatRequest {
                question: "What preprocessing does RamanSpy support?".into(),
                chat_history: None,
            })
            .await
            .unwrap();
        let empty = pipeline
            .handle(&ChatRequest {
                question: "What preprocessing does RamanSpy support?".into(),
                chat_history: Some(Vec::new()),
            })
            .await
            .unwrap();
        assert_eq!(without.answer, empty.answer);
    }

    #[tokio::test]
    async fn generation_failure_propagates() {
        let index_dir = build_kb(&[("preprocessing.html", RAMANSPY_PAGE)]).await;
        let pipeline =
            ChatPipeline::open_with(&index_dir, 5, embedder(), Arc::new(ScriptedLlm::failing()))
                .await
                .unwrap();

        let err = pipeline.answer("What is RamanSpy?", &[]).await.unwrap_err();
        assert!(err.is_generation());
    }

    #[tokio::test]
    async fn blank_answer_uses_fallback() {
        let index_dir = build_kb(&[("preprocessing.html", RAMANSPY_PAGE)]).await;
        let pipeline =
            ChatPipeline::open_with(&index_dir, 5, embedder(), Arc::new(ScriptedLlm::new([" "])))
                .await
                .unwrap();

        let answer = pipeline.answer("What is RamanSpy?", &[]).await.unwrap();
        assert_eq!(answer.answer, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn missing_index_is_unavailable() {
        let err = ChatPipeline::open_with(&temp_root(), 5, embedder(), Arc::new(EchoLlm))
            .await
            .err()
            .unwrap();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn unbuilt_index_is_unavailable() {
        let dir = temp_root();
        VectorIndex::open(&dir).await.unwrap();

        let err = ChatPipeline::open_with(&dir, 5, embedder(), Arc::new(EchoLlm))
            .await
            .err()
            .unwrap();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn different_embedding_model_is_rejected() {
        let index_dir = build_kb(&[("preprocessing.html", RAMANSPY_PAGE)]).await;
        let other: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128).unwrap());

        let err = ChatPipeline::open_with(&index_dir, 5, other, Arc::new(EchoLlm))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DokiError::Config { .. }));
    }

    #[tokio::test]
    async fn missing_api_key_fails_construction() {
        let mut config = AppConfig::default();
        config.llm.api_key_env = format!("DOKI_TEST_MISSING_{}", Uuid::now_v7().simple());

        let err = ChatPipeline::open(&config).await.err().unwrap();
        assert!(matches!(err, DokiError::Config { .. }));
        assert!(err.to_string().contains("API key not found"));
    }
}
