//! Reference Chatbot
//!
//! Answers a question in one of two ways, chosen by a router prompt:
//!
//! - **GENERAL**: a streaming tool-call loop that may use the web search tool
//! - **RETRIEVAL**: one tool-call loop per retrieved document, run in
//!   parallel and merged so each document's answer arrives as one block
//!   under a `## **Reference**: {file}` heading
//!
//! Retrieval that finds nothing falls back to the general answer.

use std::collections::HashSet;
use std::sync::Arc;

use agent_core::template::{self, fields};
use agent_core::{
    Agent, AgentBuilder, AgentError, AnswerStream, ConcurrentStreamMerger, ContentMemoizer,
    LlmProvider, Merged, MergedStream, Message, PromptTemplate, Question, Result, Tool,
};
use futures::{stream, StreamExt};

use crate::error::{env_parse, env_var};
use crate::retrieval::{ReferenceDocument, Retriever, SearchParams};
use crate::{GREETING, ROUTER_SYSTEM_PROMPT, SYSTEM_PROMPT};

/// Chatbot configuration
#[derive(Clone, Debug)]
pub struct ChatbotConfig {
    /// Name in `/api/chatbots/{name}/...`
    pub name: String,

    /// Knowledge base searched on RETRIEVAL questions
    pub domain: String,

    /// Documents answered per question
    pub retrieval_keep: usize,

    /// Earlier turns passed to the model
    pub max_history: usize,

    pub search: SearchParams,

    pub system_prompt: String,

    /// Sampling temperature of the answering loops
    pub temperature: f32,

    /// Message returned when a session is reset
    pub greeting: String,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            name: "paper".into(),
            domain: "longevity_paper".into(),
            retrieval_keep: 5,
            max_history: 10,
            search: SearchParams::default(),
            system_prompt: SYSTEM_PROMPT.into(),
            temperature: 0.01,
            greeting: GREETING.into(),
        }
    }
}

impl ChatbotConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: env_var("CHATBOT_NAME").unwrap_or(defaults.name),
            domain: env_var("CHATBOT_DOMAIN").unwrap_or(defaults.domain),
            retrieval_keep: env_parse("CHATBOT_RETRIEVAL_KEEP", defaults.retrieval_keep),
            max_history: env_parse("CHATBOT_MAX_HISTORY", defaults.max_history),
            temperature: env_parse("CHATBOT_TEMPERATURE", defaults.temperature),
            ..defaults
        }
    }
}

/// Where a question is answered from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    General,
    Retrieval,
}

/// Router + general answer + parallel reference answers
pub struct ReferenceChatbot {
    config: ChatbotConfig,
    agent: Agent,
    retriever: Option<Arc<dyn Retriever>>,
    router: PromptTemplate,
    reference: PromptTemplate,
}

impl ReferenceChatbot {
    /// `agent` answers both kinds of question and should carry the search
    /// tool. Without a retriever every question is answered generally.
    pub fn new(
        config: ChatbotConfig,
        agent: Agent,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> Self {
        Self {
            config,
            agent,
            retriever,
            router: template::query_router(),
            reference: template::reference_question(),
        }
    }

    /// Build the answering agent from `config`, with `search` as its only
    /// tool when given.
    pub fn build(
        config: ChatbotConfig,
        provider: Arc<dyn LlmProvider>,
        search: Option<Arc<dyn Tool>>,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> Result<Self> {
        let mut builder = AgentBuilder::new()
            .provider(provider)
            .system_prompt(config.system_prompt.clone())
            .temperature(config.temperature);
        if let Some(search) = search {
            builder = builder.tool_arc(search);
        }
        Ok(Self::new(config, builder.build()?, retriever))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ChatbotConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> &str {
        &self.config.system_prompt
    }

    pub fn greeting(&self) -> &str {
        &self.config.greeting
    }

    /// Ask the router prompt where `question` should be answered from
    pub async fn route(&self, question: &str) -> Result<Route> {
        let mut chat = self.agent.round_chat(ROUTER_SYSTEM_PROMPT, &[], 0);
        chat.options.max_tokens = 512;
        let prompt = self.router.render(&fields([("question", question)]))?;
        let reply = chat.send(prompt).await?;
        let label = self.router.extract(&reply)?.into_text();
        tracing::debug!(chatbot = %self.config.name, %label, "question routed");
        Ok(if label == "RETRIEVAL" {
            Route::Retrieval
        } else {
            Route::General
        })
    }

    /// Reference documents for `question`. Retrieval failures are logged
    /// and yield no documents.
    pub async fn references(&self, question: &str) -> Vec<ReferenceDocument> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        match retriever
            .references(
                question,
                &self.config.domain,
                &self.config.search,
                self.config.retrieval_keep,
            )
            .await
        {
            Ok(docs) => docs,
            Err(err) => {
                tracing::warn!(chatbot = %self.config.name, error = %err, "retrieval failed");
                Vec::new()
            }
        }
    }

    /// Stream the answer to `question`. `history` holds earlier turns,
    /// oldest first.
    pub async fn answer(&self, question: &str, history: &[Message]) -> Result<AnswerStream> {
        let history = self.recent(history);
        let route = self.route(question).await?;

        if route == Route::Retrieval {
            let docs = self.references(question).await;
            if !docs.is_empty() {
                tracing::info!(
                    chatbot = %self.config.name,
                    documents = docs.len(),
                    "answering from references"
                );
                return self.answer_with_references(question, &history, docs);
            }
            tracing::info!(chatbot = %self.config.name, "no references found, answering generally");
        }
        Ok(self.general_answer(question, history))
    }

    fn recent(&self, history: &[Message]) -> Vec<Message> {
        let skip = history.len().saturating_sub(self.config.max_history);
        history[skip..].to_vec()
    }

    fn general_answer(&self, question: &str, history: Vec<Message>) -> AnswerStream {
        self.agent.tool_call_chat(
            Question::new(question)
                .with_history(history)
                .with_memo(Arc::new(ContentMemoizer::new())),
        )
    }

    fn answer_with_references(
        &self,
        question: &str,
        history: &[Message],
        docs: Vec<ReferenceDocument>,
    ) -> Result<AnswerStream> {
        let memo = Arc::new(ContentMemoizer::new());
        let mut branches = Vec::with_capacity(docs.len());
        for doc in docs {
            let prompt = self.reference.render(&fields([
                ("question", question),
                ("reference", doc.text.as_str()),
            ]))?;
            let answer = self.agent.tool_call_chat(
                Question::new(prompt)
                    .with_history(history.to_vec())
                    .with_memo(memo.clone()),
            );
            branches.push(with_reference_heading(&doc.file_name, answer));
        }
        Ok(blocks(ConcurrentStreamMerger::new(branches).into_stream()))
    }
}

/// Prefix the first piece of `answer` with the document heading
fn with_reference_heading(file_name: &str, answer: AnswerStream) -> AnswerStream {
    let mut heading = Some(format!("## **Reference**: {file_name}\n"));
    Box::pin(answer.map(move |item| {
        item.map(|text| match heading.take() {
            Some(mut first) => {
                first.push_str(&text);
                first
            }
            None => text,
        })
    }))
}

struct Blocks {
    merged: MergedStream,
    answered: HashSet<usize>,
    finished: bool,
}

/// Turn merged events into text: a blank line closes each branch that
/// answered. A merge in which no branch answered ends with an error.
fn blocks(merged: MergedStream) -> AnswerStream {
    let state = Blocks {
        merged,
        answered: HashSet::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            match state.merged.next().await {
                Some(Merged::Token { branch, text }) => {
                    state.answered.insert(branch);
                    return Some((Ok(text), state));
                }
                Some(Merged::End { branch }) => {
                    if state.answered.contains(&branch) {
                        return Some((Ok("\n\n".to_string()), state));
                    }
                }
                None => {
                    state.finished = true;
                    if state.answered.is_empty() {
                        let err = AgentError::Other("no reference produced an answer".into());
                        return Some((Err(err), state));
                    }
                    return None;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{RetrievalReference, StaticRetriever};
    use agent_core::testing::{Reply, ScriptedProvider};
    use agent_core::RetryPolicy;

    fn chatbot(provider: Arc<ScriptedProvider>, retriever: Option<Arc<dyn Retriever>>) -> ReferenceChatbot {
        let agent = AgentBuilder::new()
            .provider(provider)
            .system_prompt(SYSTEM_PROMPT)
            .model_retry(RetryPolicy::none())
            .build()
            .unwrap();
        ReferenceChatbot::new(ChatbotConfig::default(), agent, retriever)
    }

    fn papers() -> Arc<dyn Retriever> {
        Arc::new(StaticRetriever::new(vec![
            RetrievalReference::new("a.pdf", "alpha", 0),
            RetrievalReference::new("b.pdf", "beta", 0),
        ]))
    }

    async fn collect(stream: AnswerStream) -> (String, Option<AgentError>) {
        let items: Vec<Result<String>> = stream.collect().await;
        let mut text = String::new();
        for item in items {
            match item {
                Ok(piece) => text.push_str(&piece),
                Err(err) => return (text, Some(err)),
            }
        }
        (text, None)
    }

    #[tokio::test]
    async fn test_route_labels() {
        let provider = Arc::new(ScriptedProvider::new([
            Reply::text("RETRIEVAL NEEDED"),
            Reply::text("GENERAL ANSWER"),
        ]));
        let bot = chatbot(provider.clone(), None);

        assert_eq!(bot.route("what did trial X find?").await.unwrap(), Route::Retrieval);
        assert_eq!(bot.route("hello").await.unwrap(), Route::General);

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].content, ROUTER_SYSTEM_PROMPT);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.options.max_tokens, 512);
    }

    #[tokio::test]
    async fn test_general_question_uses_tool_loop() {
        let provider = Arc::new(ScriptedProvider::new([
            Reply::text("GENERAL ANSWER"),
            Reply::chunks(["Final Answer: ", "hi there"]),
        ]));
        let bot = chatbot(provider.clone(), Some(papers()));

        let history = [Message::user("earlier"), Message::assistant("reply")];
        let (text, err) = collect(bot.answer("hello", &history).await.unwrap()).await;
        assert!(err.is_none());
        assert_eq!(text, "hi there");

        let loop_request = &provider.requests()[1];
        assert_eq!(loop_request.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(loop_request.messages[1], Message::user("earlier"));
    }

    #[tokio::test]
    async fn test_retrieval_answers_per_reference() {
        let provider = Arc::new(ScriptedProvider::new([
            Reply::text("RETRIEVAL NEEDED"),
            Reply::text("Final Answer: ok"),
            Reply::text("Final Answer: ok"),
        ]));
        let bot = chatbot(provider.clone(), Some(papers()));

        let (text, err) = collect(bot.answer("what is alpha?", &[]).await.unwrap()).await;
        assert!(err.is_none());
        let a = "## **Reference**: a.pdf\nok\n\n";
        let b = "## **Reference**: b.pdf\nok\n\n";
        assert!(text == format!("{a}{b}") || text == format!("{b}{a}"), "{text:?}");

        let prompts: Vec<String> = provider.requests()[1..]
            .iter()
            .map(|r| r.messages.last().unwrap().content.clone())
            .collect();
        assert!(prompts.iter().any(|p| p.contains("**File Name**: a.pdf")));
        assert!(prompts.iter().any(|p| p.contains("**File Name**: b.pdf")));
    }

    #[tokio::test]
    async fn test_retrieval_without_references_falls_back() {
        let provider = Arc::new(ScriptedProvider::new([
            Reply::text("RETRIEVAL NEEDED"),
            Reply::text("Final Answer: general"),
        ]));
        let empty: Arc<dyn Retriever> = Arc::new(StaticRetriever::default());
        let bot = chatbot(provider, Some(empty));

        let (text, err) = collect(bot.answer("q", &[]).await.unwrap()).await;
        assert!(err.is_none());
        assert_eq!(text, "general");
    }

    #[tokio::test]
    async fn test_router_failure_is_returned() {
        let provider = Arc::new(ScriptedProvider::new([Reply::ProviderError("down".into())]));
        let bot = chatbot(provider, None);
        assert!(bot.answer("q", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_all_branches_failing_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new([
            Reply::text("RETRIEVAL NEEDED"),
            Reply::ProviderError("down".into()),
            Reply::ProviderError("down".into()),
        ]));
        let bot = chatbot(provider, Some(papers()));

        let (text, err) = collect(bot.answer("q", &[]).await.unwrap()).await;
        assert!(text.is_empty());
        assert!(err.is_some());
    }

    #[test]
    fn test_history_is_trimmed() {
        let provider = Arc::new(ScriptedProvider::new([]));
        let mut bot = chatbot(provider, None);
        bot.config.max_history = 2;
        let history: Vec<_> = (0..5).map(|i| Message::user(i.to_string())).collect();
        assert_eq!(bot.recent(&history), [Message::user("3"), Message::user("4")]);
    }

    #[test]
    fn test_config_defaults() {
        let config = ChatbotConfig::default();
        assert_eq!(config.name, "paper");
        assert_eq!(config.domain, "longevity_paper");
        assert_eq!(config.retrieval_keep, 5);
        assert_eq!(config.max_history, 10);
    }

    #[tokio::test]
    async fn test_build_wires_search_tool() {
        use agent_core::{FnTool, ParameterSchema};
        use futures::FutureExt;

        let provider = Arc::new(ScriptedProvider::new([]));
        let search: Arc<dyn Tool> = Arc::new(FnTool::new(
            crate::SEARCH_TOOL_NAME,
            "web search",
            vec![ParameterSchema::new("query", "string", "keywords")],
            |_| async { Ok(String::new()) }.boxed(),
        ));
        let bot = ReferenceChatbot::build(ChatbotConfig::default(), provider, Some(search), None)
            .unwrap();
        assert_eq!(bot.agent.tools().names(), ["Search Engine"]);
        assert_eq!(bot.agent.config().system_prompt, SYSTEM_PROMPT);
        assert_eq!(bot.name(), "paper");
    }
}
