use crate::embeddings::Embedder;
use crate::error::{bounded, ChatError};
use crate::index::{InMemoryIndex, VectorIndex};
use crate::llm::LanguageModel;
use crate::models::{ChainOptions, ChatHistory, RetrievedChunk, Turn};
use serde::Serialize;
use std::sync::Arc;

const CONDENSE_PROMPT: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

const ANSWER_PROMPT: &str = "Use the following pieces of context to answer the question at the \
end. If you don't know the answer, just say that you don't know, don't try to make up an answer.";

#[derive(Debug, Clone, Serialize)]
pub struct ChainResponse {
    pub answer: String,
    /// The question actually used for retrieval, after condensing.
    pub standalone_question: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Question answering over one built index, with its own turn log.
pub struct ConversationChain {
    index: InMemoryIndex,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    history: ChatHistory,
    options: ChainOptions,
}

impl ConversationChain {
    pub fn new(
        index: InMemoryIndex,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        options: ChainOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            history: ChatHistory::new(),
            options,
        }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn index(&self) -> &InMemoryIndex {
        &self.index
    }

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    pub async fn ask(&mut self, question: &str) -> Result<String, ChatError> {
        Ok(self.respond(question).await?.answer)
    }

    /// Answers `question` and records the exchange. Nothing is recorded when
    /// any step fails.
    pub async fn respond(&mut self, question: &str) -> Result<ChainResponse, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let context_turns = self.history.recent(self.options.history_window);
        let standalone_question = if self.options.condense_question && !context_turns.is_empty() {
            let prompt = condense_prompt(context_turns, question);
            let rewritten = bounded(
                "question condensing",
                self.options.call_timeout,
                self.llm.complete(&prompt, &self.options.generation),
            )
            .await?;
            if rewritten.trim().is_empty() {
                question.to_string()
            } else {
                rewritten.trim().to_string()
            }
        } else {
            question.to_string()
        };

        let sources = self.retrieve(&standalone_question).await?;

        let history_in_prompt = if self.options.condense_question {
            &[][..]
        } else {
            context_turns
        };
        let prompt = answer_prompt(&sources, history_in_prompt, &standalone_question);
        let answer = bounded(
            "completion",
            self.options.call_timeout,
            self.llm.complete(&prompt, &self.options.generation),
        )
        .await?;

        tracing::debug!(
            model = self.llm.model_name(),
            sources = sources.len(),
            history_turns = self.history.len(),
            "question answered"
        );

        self.history.record_exchange(question, answer.clone());

        Ok(ChainResponse {
            answer,
            standalone_question,
            sources,
        })
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>, ChatError> {
        let query_vector = bounded(
            "query embedding",
            self.options.call_timeout,
            self.embedder.embed_query(question),
        )
        .await?;
        self.index.search(&query_vector, self.options.top_k)
    }
}

fn format_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn condense_prompt(turns: &[Turn], question: &str) -> String {
    format!(
        "{CONDENSE_PROMPT}\n\nChat History:\n{}\nFollow Up Input: {question}\nStandalone question:",
        format_turns(turns)
    )
}

fn answer_prompt(sources: &[RetrievedChunk], turns: &[Turn], question: &str) -> String {
    let context = sources
        .iter()
        .map(|source| source.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = format!("{ANSWER_PROMPT}\n\n{context}\n\n");
    if !turns.is_empty() {
        prompt.push_str("Chat History:\n");
        prompt.push_str(&format_turns(turns));
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("Question: {question}\nHelpful Answer:"));
    prompt
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::index::build_index;
    use crate::models::{GenerationParams, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records prompts and answers with a numbered reply, or fails on demand.
    #[derive(Default)]
    pub(crate) struct ScriptedModel {
        pub(crate) prompts: Mutex<Vec<String>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, ChatError> {
            if self.fail {
                return Err(ChatError::BackendResponse {
                    backend: "scripted".to_string(),
                    details: "429 Too Many Requests".to_string(),
                });
            }
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            if prompt.ends_with("Standalone question:") {
                Ok("What is alpha about?".to_string())
            } else {
                Ok(format!("answer {}", prompts.len()))
            }
        }
    }

    async fn chain_over(
        chunks: &[&str],
        llm: Arc<dyn LanguageModel>,
        options: ChainOptions,
    ) -> ConversationChain {
        chain_with(chunks, Arc::new(CharacterNgramEmbedder::default()), llm, options).await
    }

    async fn chain_with(
        chunks: &[&str],
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        options: ChainOptions,
    ) -> ConversationChain {
        let chunks: Vec<String> = chunks.iter().map(|chunk| chunk.to_string()).collect();
        let index = build_index(embedder.as_ref(), &chunks, Duration::from_secs(5))
            .await
            .unwrap();
        ConversationChain::new(index, embedder, llm, options)
    }

    /// Never answers within any deadline.
    struct StalledModel;

    #[async_trait]
    impl LanguageModel for StalledModel {
        fn model_name(&self) -> &str {
            "stalled"
        }

        async fn complete(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, ChatError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    /// Embeds documents immediately but stalls on questions.
    struct StalledQueries;

    #[async_trait]
    impl Embedder for StalledQueries {
        fn model_name(&self) -> &str {
            "stalled-queries"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
            Ok(CharacterNgramEmbedder::default().vectorize(text))
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, ChatError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ChatError::Embedding("too late".to_string()))
        }
    }

    #[tokio::test]
    async fn first_question_retrieves_and_records_one_exchange() {
        let llm = Arc::new(ScriptedModel::default());
        let mut chain = chain_over(
            &["Alpha line one\nAlpha line two", "Beta has nothing to do with it"],
            llm.clone(),
            ChainOptions::default(),
        )
        .await;

        let response = chain.respond("What is alpha line about?").await.unwrap();

        assert_eq!(response.sources[0].text, "Alpha line one\nAlpha line two");
        assert_eq!(response.standalone_question, "What is alpha line about?");
        assert_eq!(
            chain.history().turns(),
            &[
                Turn::user("What is alpha line about?"),
                Turn::assistant(response.answer.clone())
            ]
        );

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Alpha line one"));
        assert!(prompts[0].ends_with("Question: What is alpha line about?\nHelpful Answer:"));
    }

    #[tokio::test]
    async fn history_grows_by_two_per_question_and_alternates() {
        let llm = Arc::new(ScriptedModel::default());
        let mut chain = chain_over(&["Alpha line one"], llm, ChainOptions::default()).await;

        for question in ["one?", "two?", "three?"] {
            chain.ask(question).await.unwrap();
        }

        let turns = chain.history().turns();
        assert_eq!(turns.len(), 6);
        for (position, turn) in turns.iter().enumerate() {
            let expected = if position % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
        assert_eq!(turns[2].content, "two?");
    }

    #[tokio::test]
    async fn follow_up_questions_are_condensed_with_history() {
        let llm = Arc::new(ScriptedModel::default());
        let mut chain = chain_over(&["Alpha line one"], llm.clone(), ChainOptions::default()).await;

        chain.ask("What is this about?").await.unwrap();
        let response = chain.respond("And more?").await.unwrap();

        assert_eq!(response.standalone_question, "What is alpha about?");
        assert_eq!(chain.history().turns()[2].content, "And more?");

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("Human: What is this about?\nAssistant: answer 1"));
        assert!(prompts[1].contains("Follow Up Input: And more?"));
        assert!(prompts[2].contains("Question: What is alpha about?"));
    }

    #[tokio::test]
    async fn history_window_bounds_resubmitted_turns() {
        let llm = Arc::new(ScriptedModel::default());
        let options = ChainOptions {
            condense_question: false,
            history_window: Some(2),
            ..ChainOptions::default()
        };
        let mut chain = chain_over(&["Alpha line one"], llm.clone(), options).await;

        chain.ask("first?").await.unwrap();
        chain.ask("second?").await.unwrap();
        chain.ask("third?").await.unwrap();

        let prompts = llm.prompts.lock().unwrap();
        let last = prompts.last().unwrap();
        assert!(last.contains("Human: second?"));
        assert!(!last.contains("Human: first?"));
        assert_eq!(chain.history().len(), 6);
    }

    #[tokio::test]
    async fn failed_completion_leaves_history_untouched() {
        let llm = Arc::new(ScriptedModel {
            fail: true,
            ..ScriptedModel::default()
        });
        let mut chain = chain_over(&["Alpha line one"], llm, ChainOptions::default()).await;

        let result = chain.ask("What is this about?").await;

        assert!(matches!(result, Err(ChatError::BackendResponse { .. })));
        assert!(chain.history().is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let llm = Arc::new(ScriptedModel::default());
        let mut chain = chain_over(&["Alpha line one"], llm, ChainOptions::default()).await;

        assert!(matches!(chain.ask("   ").await, Err(ChatError::EmptyQuestion)));
        assert!(chain.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_completion_times_out_without_recording() {
        let options = ChainOptions {
            call_timeout: Duration::from_secs(2),
            ..ChainOptions::default()
        };
        let mut chain = chain_over(&["Alpha line one"], Arc::new(StalledModel), options).await;

        let result = chain.ask("What is this about?").await;

        match result {
            Err(ChatError::Timeout { operation, seconds }) => {
                assert_eq!(operation, "completion");
                assert_eq!(seconds, 2);
            }
            other => panic!("expected a completion timeout, got {other:?}"),
        }
        assert!(chain.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_query_embedding_times_out() {
        let llm = Arc::new(ScriptedModel::default());
        let options = ChainOptions {
            call_timeout: Duration::from_secs(2),
            ..ChainOptions::default()
        };
        let mut chain =
            chain_with(&["Alpha line one"], Arc::new(StalledQueries), llm.clone(), options).await;

        let result = chain.ask("What is this about?").await;

        assert!(matches!(
            result,
            Err(ChatError::Timeout { ref operation, .. }) if operation == "query embedding"
        ));
        assert!(chain.history().is_empty());
        assert!(llm.prompts.lock().unwrap().is_empty());
    }
}
