//! The insurance FAQ workflow: build the index, then answer.
//!
//! ```text
//! Trigger { question }
//!        │
//!        ▼
//!  build_index ──▶ IndexOutcome ──▶ generate_answer ──▶ WorkflowResult
//! ```
//!
//! The two stages run strictly in sequence and the intermediate result is
//! passed by value. [`FaqService`] bundles configuration and providers for
//! callers that answer many questions, optionally reusing one built index.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::answer::{answer_with_index, check_question, generate_answer};
use crate::builder::build_index;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::FaqError;
use crate::generation::{create_chat_model, ChatModel};
use crate::index::VectorIndex;
use crate::models::{AnswerOutcome, IndexOutcome, Trigger, WorkflowResult};

/// Run both stages for one question, rebuilding the index from scratch.
///
/// A blank question fails before the document is touched.
pub async fn run_workflow(
    config: &Config,
    trigger: &Trigger,
    embedder: &dyn Embedder,
    chat: &dyn ChatModel,
) -> WorkflowResult {
    if let Err(err) = check_question(&trigger.question) {
        return AnswerOutcome::Failed(err).into();
    }

    let index = build_index(config, embedder).await;
    generate_answer(config, &index, &trigger.question, embedder, chat)
        .await
        .into()
}

/// Configuration plus the providers both stages share.
pub struct FaqService {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    cached: OnceCell<Arc<VectorIndex>>,
}

impl FaqService {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> Self {
        Self {
            config: Arc::new(config),
            embedder,
            chat,
            cached: OnceCell::new(),
        }
    }

    /// Construct providers from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let chat = create_chat_model(&config.generation)?;
        Ok(Self::new(config, embedder, chat))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Answer one question.
    ///
    /// With `workflow.cache_index` off, this is exactly [`run_workflow`].
    /// With it on, the first successful build is kept and reused; a failed
    /// build is reported and retried on the next request.
    pub async fn ask(&self, question: &str) -> WorkflowResult {
        if let Err(err) = check_question(question) {
            return AnswerOutcome::Failed(err).into();
        }

        let trigger = Trigger {
            question: question.to_string(),
        };

        if !self.config.workflow.cache_index {
            return run_workflow(&self.config, &trigger, self.embedder.as_ref(), self.chat.as_ref())
                .await;
        }

        let index = self
            .cached
            .get_or_try_init(|| async {
                match build_index(&self.config, self.embedder.as_ref()).await {
                    IndexOutcome::Ready(index) => Ok(Arc::new(index)),
                    IndexOutcome::Failed(err) => Err(err),
                }
            })
            .await;

        let outcome = match index {
            Ok(index) => match answer_with_index(
                &self.config,
                index,
                &trigger.question,
                self.embedder.as_ref(),
                self.chat.as_ref(),
            )
            .await
            {
                Ok(answer) => AnswerOutcome::Answered(answer),
                Err(err) => {
                    tracing::error!(error = %err, "error generating response");
                    AnswerOutcome::Failed(err)
                }
            },
            Err(err) => AnswerOutcome::Failed(FaqError::IndexUnavailable(err.to_string())),
        };
        outcome.into()
    }

    /// Run only the build stage.
    pub async fn build(&self) -> IndexOutcome {
        build_index(&self.config, self.embedder.as_ref()).await
    }
}
