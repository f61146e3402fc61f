//! Answer-generation stage.
//!
//! Consumes the build stage's [`IndexOutcome`], retrieves the top-K chunks in
//! the target language, and asks the chat model for a grounded answer. A
//! failed build short-circuits to [`FaqError::IndexUnavailable`] before any
//! provider is touched.

use crate::config::Config;
use crate::embedding::{embed_query, Embedder};
use crate::error::{classify, FaqError};
use crate::generation::{ChatMessage, ChatModel};
use crate::index::{ChunkFilter, ScoredChunk, VectorIndex};
use crate::models::{AnswerOutcome, IndexOutcome};
use crate::prompt::system_prompt;

/// Answer `question` from the build stage's outcome.
///
/// Never returns an error directly; failures are reported as
/// [`AnswerOutcome::Failed`]:
///
/// - a failed build gives [`FaqError::IndexUnavailable`] without embedding
///   the question or calling the chat model;
/// - a blank question gives [`FaqError::InvalidQuestion`];
/// - query embedding and search problems give [`FaqError::RetrievalFailure`];
/// - an unusable chat reply gives [`FaqError::GenerationFailure`];
/// - transport errors from either provider give
///   [`FaqError::UpstreamDependencyFailure`].
pub async fn generate_answer(
    config: &Config,
    index: &IndexOutcome,
    question: &str,
    embedder: &dyn Embedder,
    chat: &dyn ChatModel,
) -> AnswerOutcome {
    let index = match index {
        IndexOutcome::Ready(index) => index,
        IndexOutcome::Failed(err) => {
            tracing::warn!(cause = %err, "skipping generation, index unavailable");
            return AnswerOutcome::Failed(FaqError::IndexUnavailable(err.to_string()));
        }
    };

    match answer_with_index(config, index, question, embedder, chat).await {
        Ok(answer) => AnswerOutcome::Answered(answer),
        Err(err) => {
            tracing::error!(error = %err, "error generating response");
            AnswerOutcome::Failed(err)
        }
    }
}

/// Reject questions that are empty after trimming.
pub fn check_question(question: &str) -> Result<(), FaqError> {
    if question.trim().is_empty() {
        return Err(FaqError::InvalidQuestion(
            "question must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Retrieve and generate against a ready index.
pub async fn answer_with_index(
    config: &Config,
    index: &VectorIndex,
    question: &str,
    embedder: &dyn Embedder,
    chat: &dyn ChatModel,
) -> Result<String, FaqError> {
    check_question(question)?;

    if index.is_empty() {
        tracing::info!("index holds no chunks, returning no-context answer");
        return Ok(config.generation.no_context_answer.clone());
    }

    let hits = retrieve(config, index, question, embedder).await?;
    if hits.is_empty() {
        tracing::info!(
            language = %config.retrieval.language,
            "no chunks matched the language filter, returning no-context answer"
        );
        return Ok(config.generation.no_context_answer.clone());
    }

    let messages = [
        ChatMessage::system(system_prompt(&hits)),
        ChatMessage::user(question),
    ];

    chat.generate(&messages)
        .await
        .map_err(|e| classify(e, FaqError::GenerationFailure))
}

/// Embed the question and return the top-K chunks in the target language.
pub async fn retrieve(
    config: &Config,
    index: &VectorIndex,
    question: &str,
    embedder: &dyn Embedder,
) -> Result<Vec<ScoredChunk>, FaqError> {
    if embedder.model_name() != index.model() || embedder.dims() != index.dims() {
        return Err(FaqError::RetrievalFailure(format!(
            "query embedder '{}' ({} dims) does not match index '{}' ({} dims)",
            embedder.model_name(),
            embedder.dims(),
            index.model(),
            index.dims()
        )));
    }

    let query_vec = embed_query(embedder, question)
        .await
        .map_err(|e| classify(e.context("embedding question"), FaqError::RetrievalFailure))?;

    let filter = ChunkFilter::language(config.retrieval.language.clone());
    let hits = index
        .search(&query_vec, config.retrieval.top_k, Some(&filter))
        .map_err(|e| FaqError::RetrievalFailure(e.to_string()))?;

    tracing::info!(retrieved = hits.len(), top_k = config.retrieval.top_k, "retrieved chunks");
    for hit in &hits {
        tracing::debug!(
            chunk = hit.chunk.chunk_index,
            page = hit.chunk.metadata.page,
            score = hit.score,
            "retrieved chunk"
        );
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_index;
    use crate::config::GenerationConfig;
    use crate::generation::OpenAIChat;
    use crate::models::{Chunk, ChunkMetadata};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok("answer".to_string())
        }
    }

    fn index_with(languages: &[&str]) -> VectorIndex {
        let chunks: Vec<Chunk> = languages
            .iter()
            .enumerate()
            .map(|(i, l)| Chunk {
                id: i.to_string(),
                chunk_index: i,
                text: format!("条款{}", i),
                hash: String::new(),
                start_char: 0,
                end_char: 0,
                hard_cut: false,
                metadata: ChunkMetadata {
                    source: "plan".into(),
                    language: l.to_string(),
                    chunk_type: "insurance_policy".into(),
                    page: 1,
                },
            })
            .collect();
        let vectors = vec![vec![1.0, 0.0]; chunks.len()];
        VectorIndex::new("unit", 2, chunks, vectors).unwrap()
    }

    #[tokio::test]
    async fn sends_system_then_user_message() {
        let config = Config::from_document("unused.txt");
        let chat = RecordingChat::default();
        let index = index_with(&["zh-CN"]);
        let answer = answer_with_index(&config, &index, "保费是多少?", &UnitEmbedder, &chat)
            .await
            .unwrap();
        assert_eq!(answer, "answer");
        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].role, crate::generation::Role::System);
        assert!(seen[0].content.contains("条款0"));
        assert_eq!(seen[1], ChatMessage::user("保费是多少?"));
    }

    #[tokio::test]
    async fn only_foreign_chunks_gives_no_context_answer() {
        let config = Config::from_document("unused.txt");
        let chat = RecordingChat::default();
        let index = index_with(&["en", "en"]);
        let answer = answer_with_index(&config, &index, "保费?", &UnitEmbedder, &chat)
            .await
            .unwrap();
        assert_eq!(answer, config.generation.no_context_answer);
        assert!(chat.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_question_rejected() {
        let config = Config::from_document("unused.txt");
        let index = index_with(&["zh-CN"]);
        let chat = RecordingChat::default();
        let err = answer_with_index(&config, &index, "  ", &UnitEmbedder, &chat)
            .await
            .unwrap_err();
        assert!(matches!(err, FaqError::InvalidQuestion(_)));
    }

    #[tokio::test]
    async fn mismatched_embedder_is_retrieval_failure() {
        let config = Config::from_document("unused.txt");
        let chunks: Vec<Chunk> = index_with(&["zh-CN"]).chunks().cloned().collect();
        let index = VectorIndex::new("other-model", 2, chunks, vec![vec![1.0, 0.0]]).unwrap();
        let err = retrieve(&config, &index, "保费?", &UnitEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, FaqError::RetrievalFailure(_)));
    }

    /// Succeeds for the build's batch call, fails for everything after.
    #[derive(Default)]
    struct FailsAfterBuild {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FailsAfterBuild {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                bail!("boom");
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn query_embedding_failure_is_retrieval_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("plan.txt");
        std::fs::write(&path, "保费为每年港币10,000元，缴费期为5年。").unwrap();
        let mut config = Config::from_document(path);
        config.embedding.dims = 2;

        let embedder = FailsAfterBuild::default();
        let chat = RecordingChat::default();
        let index = build_index(&config, &embedder).await;
        assert!(index.is_ready());

        match generate_answer(&config, &index, "保费是多少?", &embedder, &chat).await {
            AnswerOutcome::Failed(FaqError::RetrievalFailure(msg)) => {
                assert!(msg.contains("embedding question"), "got: {}", msg);
                assert!(msg.contains("boom"), "got: {}", msg);
            }
            other => panic!("expected retrieval failure, got {:?}", other),
        }
        assert!(chat.seen.lock().unwrap().is_empty());
    }

    /// Serve `body` with `status` on every path; returns the `/v1` base URL.
    async fn stub_api(status: StatusCode, body: &'static str) -> String {
        let app = axum::Router::new().fallback(move || async move { (status, body) });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/v1", addr)
    }

    async fn answer_via(base_url: String) -> Result<String, FaqError> {
        let config = Config::from_document("unused.txt");
        let chat = OpenAIChat::with_api_key(
            &GenerationConfig {
                base_url,
                ..GenerationConfig::default()
            },
            "sk-test".into(),
        )
        .unwrap();
        let index = index_with(&["zh-CN"]);
        answer_with_index(&config, &index, "保费是多少?", &UnitEmbedder, &chat).await
    }

    #[tokio::test]
    async fn server_error_from_chat_is_generation_failure() {
        let base = stub_api(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").await;
        match answer_via(base).await {
            Err(FaqError::GenerationFailure(msg)) => {
                assert!(msg.contains("500"), "got: {}", msg);
                assert!(msg.contains("upstream exploded"), "got: {}", msg);
            }
            other => panic!("expected generation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_json_chat_reply_is_generation_failure() {
        let base = stub_api(StatusCode::OK, "<html>not json</html>").await;
        match answer_via(base).await {
            Err(FaqError::GenerationFailure(msg)) => {
                assert!(msg.contains("not JSON"), "got: {}", msg)
            }
            other => panic!("expected generation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn choiceless_chat_reply_is_generation_failure() {
        let base = stub_api(StatusCode::OK, r#"{"choices": []}"#).await;
        assert!(matches!(
            answer_via(base).await,
            Err(FaqError::GenerationFailure(_))
        ));
    }
}
