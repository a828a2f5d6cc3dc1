use crate::database::Retriever;
use crate::document::Chunk;
use crate::llm::memory::{ConversationMemory, Exchange};
use crate::providers::traits::{ChatMessage, ChatProvider};
use crate::providers::utils::truncate_chars;
use crate::utils::metrics::MetricsCollector;
use anyhow::Result;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{error, info};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

const NO_CONTEXT: &str = "No relevant content was found in the document.";
const NOT_FOUND_REPLY: &str = "I could not find this information in the document.";

#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    pub memory_size: usize,
    pub max_history: usize,
    pub retriever_type: String,
    pub llm_model: String,
}

pub fn format_context(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("Document {} (Page {}):\n{}", i + 1, chunk.page, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn language_rule(question: &str) -> String {
    match whatlang::detect(question).filter(|info| info.is_reliable()) {
        Some(info) => format!("Answer in {}, the language of the question", info.lang().eng_name()),
        None => "Answer in the same language as the question".to_string(),
    }
}

pub fn system_prompt(context: &str, chat_history: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions using only the provided document.\n\n\
         Document context:\n{}\n\n\
         Conversation history (if any):\n{}\n\n\
         Rules:\n\
         1. Only answer from the information in the document context\n\
         2. If the context does not contain the answer, say \"{}\"\n\
         3. {}, naturally and clearly\n\
         4. Give detailed, well-structured answers\n\
         5. Quote the relevant passage when possible\n\
         6. Stay polite and professional\n\
         7. Use the conversation history to keep answers consistent",
        context,
        chat_history,
        NOT_FOUND_REPLY,
        language_rule(question),
    )
}

fn apology(e: &anyhow::Error) -> String {
    format!("Sorry, an error occurred while processing your question: {}", e)
}

async fn build_messages(
    retriever: &dyn Retriever,
    memory: &Mutex<ConversationMemory>,
    question: &str,
    use_memory: bool,
) -> Result<Vec<ChatMessage>> {
    let chunks = retriever.retrieve(question).await?;
    let history = if use_memory { memory.lock().context() } else { String::new() };
    Ok(vec![
        ChatMessage::system(system_prompt(&format_context(&chunks), &history, question)),
        ChatMessage::user(question),
    ])
}

/// Retrieval-augmented question answering over one indexed document.
pub struct RagPipeline {
    retriever: Arc<dyn Retriever>,
    llm: RwLock<Box<dyn ChatProvider>>,
    memory: Arc<Mutex<ConversationMemory>>,
    metrics: Arc<MetricsCollector>,
}

impl RagPipeline {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        llm: Box<dyn ChatProvider>,
        memory: ConversationMemory,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        info!("RAG pipeline using {} retriever", retriever.kind());
        Self {
            retriever,
            llm: RwLock::new(llm),
            memory: Arc::new(Mutex::new(memory)),
            metrics,
        }
    }

    /// Answers `question`. Failures are logged, counted, and turned into an
    /// apology text instead of an error.
    pub async fn ask(&self, question: &str, use_memory: bool) -> String {
        let start = Instant::now();
        info!("Processing question: {}", truncate_chars(question, 100));

        let llm = self.llm.read().clone();
        let result = async {
            let messages = build_messages(self.retriever.as_ref(), &self.memory, question, use_memory).await?;
            llm.complete(&messages).await
        }
        .await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(answer) => {
                if use_memory {
                    self.memory.lock().add_exchange(question, &answer);
                }
                self.metrics.log_question(question, elapsed, true);
                crate::success!("Answered in {:.2}s", elapsed);
                answer
            }
            Err(e) => {
                self.metrics.log_question(question, elapsed, false);
                error!("Error while answering question: {}", e);
                apology(&e)
            }
        }
    }

    /// Streams the answer token by token. Memory and metrics are updated
    /// once the stream has finished; a failure yields one apology item.
    pub fn ask_streaming(&self, question: &str, use_memory: bool) -> BoxStream<'static, String> {
        let retriever = self.retriever.clone();
        let llm = self.llm.read().clone();
        let memory = self.memory.clone();
        let metrics = self.metrics.clone();
        let question = question.to_string();

        let stream = async_stream::stream! {
            let start = Instant::now();
            info!("Processing question (streaming): {}", truncate_chars(&question, 100));

            let tokens = match build_messages(retriever.as_ref(), &memory, &question, use_memory).await {
                Ok(messages) => llm.complete_stream(&messages).await,
                Err(e) => Err(e),
            };

            let mut answer = String::new();
            let mut failure = None;
            match tokens {
                Ok(mut tokens) => {
                    while let Some(token) = tokens.next().await {
                        match token {
                            Ok(token) => {
                                answer.push_str(&token);
                                yield token;
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => failure = Some(e),
            }

            let elapsed = start.elapsed().as_secs_f64();
            match failure {
                None => {
                    if use_memory {
                        memory.lock().add_exchange(&question, &answer);
                    }
                    metrics.log_question(&question, elapsed, true);
                    crate::success!("Answered (streaming) in {:.2}s", elapsed);
                }
                Some(e) => {
                    metrics.log_question(&question, elapsed, false);
                    error!("Error while streaming answer: {}", e);
                    yield apology(&e);
                }
            }
        };
        Box::pin(stream)
    }

    pub fn clear_memory(&self) {
        self.memory.lock().clear();
        info!("Conversation memory cleared");
    }

    pub fn conversation_history(&self) -> Vec<Exchange> {
        self.memory.lock().history()
    }

    /// Swaps the chat model, e.g. after a settings change. Memory is kept.
    pub fn set_llm(&self, llm: Box<dyn ChatProvider>) {
        info!("Switching chat model to {}", llm.model_name());
        *self.llm.write() = llm;
    }

    pub fn pipeline_info(&self) -> PipelineInfo {
        let memory = self.memory.lock();
        PipelineInfo {
            memory_size: memory.len(),
            max_history: memory.max_history(),
            retriever_type: self.retriever.kind().to_string(),
            llm_model: self.llm.read().model_name().to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::providers::traits::{Role, TokenStream};
    use anyhow::anyhow;
    use async_trait::async_trait;

    pub(crate) struct FixedRetriever(pub Vec<Chunk>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Chunk>> {
            Ok(self.0.clone())
        }

        fn kind(&self) -> &'static str {
            "fixed"
        }
    }

    /// Replies with canned tokens and records the prompts it was sent.
    #[derive(Clone)]
    pub(crate) struct ScriptedChat {
        pub tokens: Vec<String>,
        pub fail: bool,
        pub prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl ScriptedChat {
        pub(crate) fn replying(tokens: &[&str]) -> Self {
            Self {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                fail: false,
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::replying(&[])
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.prompts.lock().push(messages.to_vec());
            if self.fail {
                return Err(anyhow!("model unavailable"));
            }
            Ok(self.tokens.concat())
        }

        async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
            self.prompts.lock().push(messages.to_vec());
            if self.fail {
                return Err(anyhow!("model unavailable"));
            }
            let tokens: Vec<Result<String>> = self.tokens.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(tokens)))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn clone_box(&self) -> Box<dyn ChatProvider> {
            Box::new(self.clone())
        }
    }

    pub(crate) fn sample_chunks() -> Vec<Chunk> {
        vec![Chunk {
            text: "The warranty lasts two years.".to_string(),
            page: 3,
            start_index: 0,
            chunk_index: 0,
            source: "manual.pdf".to_string(),
        }]
    }

    fn pipeline(chat: ScriptedChat, dir: &std::path::Path) -> (RagPipeline, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new(dir.join("metrics.json")));
        let pipeline = RagPipeline::new(
            Arc::new(FixedRetriever(sample_chunks())),
            Box::new(chat),
            ConversationMemory::default(),
            metrics.clone(),
        );
        (pipeline, metrics)
    }

    #[test]
    fn context_lists_documents_with_pages() {
        assert_eq!(
            format_context(&sample_chunks()),
            "Document 1 (Page 3):\nThe warranty lasts two years."
        );
        assert_eq!(format_context(&[]), NO_CONTEXT);
    }

    #[tokio::test]
    async fn ask_builds_prompt_and_remembers() {
        let dir = tempfile::tempdir().unwrap();
        let chat = ScriptedChat::replying(&["Two ", "years."]);
        let prompts = chat.prompts.clone();
        let (pipeline, metrics) = pipeline(chat, dir.path());

        assert_eq!(pipeline.ask("How long is the warranty?", true).await, "Two years.");
        pipeline.ask("And after that?", true).await;

        let prompts = prompts.lock();
        let second = &prompts[1];
        assert_eq!(second[0].role, Role::System);
        assert!(second[0].content.contains("Document 1 (Page 3):"));
        assert!(second[0].content.contains("Question: How long is the warranty?\nAnswer: Two years."));
        assert_eq!(second[1].content, "And after that?");

        assert_eq!(pipeline.pipeline_info().memory_size, 2);
        assert_eq!(metrics.snapshot().questions_asked, 2);
    }

    #[tokio::test]
    async fn memory_toggle_skips_history() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(ScriptedChat::replying(&["ok"]), dir.path());
        pipeline.ask("first", false).await;
        assert!(pipeline.conversation_history().is_empty());
    }

    #[tokio::test]
    async fn failures_become_apologies() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, metrics) = pipeline(ScriptedChat::failing(), dir.path());

        let answer = pipeline.ask("anything", true).await;
        assert!(answer.starts_with("Sorry, an error occurred"));
        assert!(answer.contains("model unavailable"));
        assert!(pipeline.conversation_history().is_empty());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_asked, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[tokio::test]
    async fn streaming_updates_memory_after_completion() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, metrics) = pipeline(ScriptedChat::replying(&["Two ", "years."]), dir.path());

        let tokens: Vec<String> = pipeline.ask_streaming("Warranty?", true).collect().await;
        assert_eq!(tokens, vec!["Two ", "years."]);

        let history = pipeline.conversation_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].answer, "Two years.");
        assert_eq!(metrics.snapshot().errors, 0);
    }

    #[tokio::test]
    async fn streaming_failure_yields_one_apology() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, metrics) = pipeline(ScriptedChat::failing(), dir.path());

        let tokens: Vec<String> = pipeline.ask_streaming("Warranty?", true).collect().await;
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].starts_with("Sorry"));
        assert_eq!(metrics.snapshot().errors, 1);
    }

    #[tokio::test]
    async fn set_llm_switches_model() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(ScriptedChat::replying(&["a"]), dir.path());
        assert_eq!(pipeline.pipeline_info().llm_model, "scripted");
        assert_eq!(pipeline.pipeline_info().retriever_type, "fixed");

        pipeline.set_llm(Box::new(ScriptedChat::replying(&["b"])));
        assert_eq!(pipeline.ask("q", false).await, "b");
    }
}
