//! The conversational loop: model call, tool dispatch, repeat until the model answers.

use std::sync::Arc;

use rise_core::config::AgentConfig;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conversation::ConversationStore;
use crate::llm::{ChatMessage, LlmClient, LlmError, ToolCall, ToolDefinition};
use crate::tools::ToolRegistry;

pub const EMPTY_REPLY_NUDGE: &str = "Respond with a real output.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentReply {
    pub thread_id: String,
    pub response: String,
    /// Listings produced by catalog tools during this turn.
    pub data: Vec<Value>,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("model kept returning empty replies after {0} nudges")]
    EmptyReplies(u32),
    #[error("model requested tools for more than {0} rounds")]
    ToolRoundsExhausted(u32),
}

#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub system_prompt: String,
    pub max_tool_rounds: u32,
    pub max_empty_retries: u32,
}

impl AgentSettings {
    pub fn from_config(config: &AgentConfig, system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_tool_rounds: config.max_tool_rounds,
            max_empty_retries: config.max_empty_retries,
        }
    }
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    conversations: ConversationStore,
    settings: AgentSettings,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        conversations: ConversationStore,
        settings: AgentSettings,
    ) -> Self {
        Self { llm, tools, conversations, settings }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Runs one user turn on `thread_id`. History is only recorded when the turn completes.
    pub async fn handle_message(&self, thread_id: &str, text: &str) -> Result<AgentReply, AgentError> {
        let history = self.conversations.history(thread_id).await;
        let definitions = self.tools.definitions();
        let mut turn = vec![ChatMessage::user(text)];
        let mut data = Vec::new();
        let mut rounds = 0;

        info!(
            event_name = "agent.turn.started",
            thread_id,
            history_len = history.len(),
            "handling guest message"
        );

        loop {
            let reply = self.complete(&history, &turn, &definitions).await?;

            if reply.tool_calls.is_empty() {
                let response = reply.text_content().unwrap_or_default().to_string();
                turn.push(reply);
                self.conversations.append(thread_id, turn).await;

                info!(
                    event_name = "agent.turn.completed",
                    thread_id,
                    tool_rounds = rounds,
                    data_items = data.len(),
                    "guest message answered"
                );
                return Ok(AgentReply { thread_id: thread_id.to_string(), response, data });
            }

            if rounds == self.settings.max_tool_rounds {
                warn!(
                    event_name = "agent.turn.rounds_exhausted",
                    thread_id,
                    max_tool_rounds = self.settings.max_tool_rounds,
                    "model did not settle on an answer"
                );
                return Err(AgentError::ToolRoundsExhausted(self.settings.max_tool_rounds));
            }
            rounds += 1;

            let calls = reply.tool_calls.clone();
            turn.push(reply);
            for call in &calls {
                let content = self.run_tool(thread_id, call, &mut data).await;
                turn.push(ChatMessage::tool_result(call.id.clone(), content));
            }
        }
    }

    async fn complete(
        &self,
        history: &[ChatMessage],
        turn: &[ChatMessage],
        definitions: &[ToolDefinition],
    ) -> Result<ChatMessage, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + turn.len() + 2);
        messages.push(ChatMessage::system(self.settings.system_prompt.clone()));
        messages.extend_from_slice(history);
        messages.extend_from_slice(turn);

        for attempt in 0..=self.settings.max_empty_retries {
            let reply = self.llm.complete(&messages, definitions).await?;
            if !reply.is_empty_reply() {
                return Ok(reply);
            }
            debug!(event_name = "agent.llm.empty_reply", attempt, "nudging model for real output");
            messages.push(ChatMessage::user(EMPTY_REPLY_NUDGE));
        }

        Err(AgentError::EmptyReplies(self.settings.max_empty_retries))
    }

    async fn run_tool(&self, thread_id: &str, call: &ToolCall, data: &mut Vec<Value>) -> String {
        match self.tools.dispatch(&call.name, call.arguments.clone()).await {
            Ok(Value::String(text)) => text,
            Ok(Value::Array(items)) => {
                let content = Value::Array(items.clone()).to_string();
                data.extend(items);
                content
            }
            Ok(other) => other.to_string(),
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    thread_id,
                    tool = %call.name,
                    error = %error,
                    "tool call failed"
                );
                format!("Error: {error}\n please fix your mistakes.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use rise_core::domain::car::NewCar;
    use rise_core::negotiation::{ConcessionPolicy, FixedJitter, Negotiator};
    use rise_db::repositories::InMemoryCarRepository;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::{AgentError, AgentRuntime, AgentSettings, EMPTY_REPLY_NUDGE};
    use crate::conversation::ConversationStore;
    use crate::llm::{ChatMessage, LlmClient, LlmError, Role, ToolCall, ToolDefinition};
    use crate::tools::{dealership_tools, LookupInformationTool};

    /// Replays canned replies and records every request it receives.
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<ChatMessage>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<ChatMessage>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), requests: Mutex::default() })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ChatMessage, LlmError> {
            self.requests.lock().await.push(messages.to_vec());
            self.replies
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![ToolCall { id: id.to_string(), name: name.to_string(), arguments }],
            tool_call_id: None,
        }
    }

    fn camry() -> NewCar {
        NewCar {
            make: "Toyota".to_string(),
            model: "Camry".to_string(),
            year: 2022,
            color: "White".to_string(),
            mileage: Some(12_000),
            description: None,
            base_price: Decimal::new(50_000, 0),
            min_price: Decimal::new(42_000, 0),
            negotiation_enabled: true,
            negotiation_flexibility: Decimal::new(3, 1),
        }
    }

    async fn runtime(llm: Arc<ScriptedLlm>, max_tool_rounds: u32) -> AgentRuntime {
        let repo = Arc::new(InMemoryCarRepository::with_cars(vec![camry()]).await.expect("seed"));
        let negotiator = Negotiator::new(
            repo.clone(),
            ConcessionPolicy::new(Arc::new(FixedJitter::none())),
        );
        let tools = dealership_tools(repo, negotiator, LookupInformationTool::unavailable());
        let settings = AgentSettings {
            system_prompt: "You are Rise.".to_string(),
            max_tool_rounds,
            max_empty_retries: 2,
        };
        AgentRuntime::new(llm, tools, ConversationStore::new(40), settings)
    }

    #[tokio::test]
    async fn catalog_results_are_returned_as_data() {
        let llm = ScriptedLlm::new(vec![
            call("c1", "get_cars_by_feature", json!({ "make": "toyota" })),
            ChatMessage::assistant("We have a white 2022 Camry."),
        ]);
        let runtime = runtime(llm.clone(), 8).await;

        let reply = runtime.handle_message("t1", "Any Toyotas?").await.expect("reply");

        assert_eq!(reply.thread_id, "t1");
        assert_eq!(reply.response, "We have a white 2022 Camry.");
        assert_eq!(reply.data.len(), 1);
        assert_eq!(reply.data[0]["model"], "Camry");

        let requests = llm.requests.lock().await;
        let second = &requests[1];
        assert_eq!(second[0].role, Role::System);
        let tool_message = second.last().expect("tool result");
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn negotiation_outcome_is_fed_back_to_the_model() {
        let llm = ScriptedLlm::new(vec![
            call("c1", "negotiate_price", json!({ "car_id": 1, "user_offer": 45000 })),
            ChatMessage::assistant("Could you do 47,600?"),
        ]);
        let runtime = runtime(llm.clone(), 8).await;

        let reply = runtime.handle_message("t1", "I offer 45000").await.expect("reply");

        assert_eq!(reply.response, "Could you do 47,600?");
        assert!(reply.data.is_empty());
        let requests = llm.requests.lock().await;
        let fed_back = requests[1].last().and_then(|message| message.content.clone());
        assert_eq!(fed_back.as_deref(), Some("Negotiate counter offer: 47600."));
    }

    #[tokio::test]
    async fn tool_errors_ask_the_model_to_fix_its_call() {
        let llm = ScriptedLlm::new(vec![
            call("c1", "negotiate_price", json!({ "car_id": 1 })),
            ChatMessage::assistant("Which offer did you have in mind?"),
        ]);
        let runtime = runtime(llm.clone(), 8).await;

        runtime.handle_message("t1", "Deal?").await.expect("reply");

        let requests = llm.requests.lock().await;
        let content = requests[1].last().and_then(|message| message.content.clone()).unwrap_or_default();
        assert!(content.starts_with("Error: "));
        assert!(content.contains("user_offer"));
        assert!(content.ends_with("\n please fix your mistakes."));
    }

    #[tokio::test]
    async fn empty_replies_are_nudged_and_not_recorded() {
        let llm = ScriptedLlm::new(vec![
            ChatMessage::assistant("   "),
            ChatMessage::assistant("Hello! How can I help?"),
        ]);
        let runtime = runtime(llm.clone(), 8).await;

        let reply = runtime.handle_message("t1", "Hello").await.expect("reply");
        assert_eq!(reply.response, "Hello! How can I help?");

        let requests = llm.requests.lock().await;
        assert_eq!(requests[1].last().and_then(|m| m.content.as_deref()), Some(EMPTY_REPLY_NUDGE));

        let history = runtime.conversations().history("t1").await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|message| message.content.as_deref() != Some(EMPTY_REPLY_NUDGE)));
    }

    #[tokio::test]
    async fn persistent_empty_replies_fail_the_turn() {
        let llm = ScriptedLlm::new(vec![
            ChatMessage::assistant(""),
            ChatMessage::assistant(""),
            ChatMessage::assistant(""),
        ]);
        let runtime = runtime(llm, 8).await;

        let error = runtime.handle_message("t1", "Hello").await.expect_err("empty");
        assert!(matches!(error, AgentError::EmptyReplies(2)));
        assert!(runtime.conversations().history("t1").await.is_empty());
    }

    #[tokio::test]
    async fn tool_rounds_are_bounded() {
        let llm = ScriptedLlm::new(vec![
            call("c1", "get_all_cars", json!({})),
            call("c2", "get_all_cars", json!({})),
        ]);
        let runtime = runtime(llm, 1).await;

        let error = runtime.handle_message("t1", "Loop").await.expect_err("bounded");
        assert!(matches!(error, AgentError::ToolRoundsExhausted(1)));
    }

    #[tokio::test]
    async fn history_carries_into_the_next_turn() {
        let llm = ScriptedLlm::new(vec![
            ChatMessage::assistant("Hi there."),
            ChatMessage::assistant("Still here."),
        ]);
        let runtime = runtime(llm.clone(), 8).await;

        runtime.handle_message("t1", "Hi").await.expect("first");
        runtime.handle_message("t1", "Are you there?").await.expect("second");

        let requests = llm.requests.lock().await;
        let contents: Vec<_> =
            requests[1].iter().map(|message| message.content.clone().unwrap_or_default()).collect();
        assert_eq!(contents, vec!["You are Rise.", "Hi", "Hi there.", "Are you there?"]);
    }
}
