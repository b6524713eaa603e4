use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::llm::{ChatMessage, Role};

/// Per-thread message history, oldest first. The system prompt is not stored.
pub struct ConversationStore {
    threads: RwLock<HashMap<String, Vec<ChatMessage>>>,
    max_messages: usize,
}

impl ConversationStore {
    pub fn new(max_messages: usize) -> Self {
        Self { threads: RwLock::new(HashMap::new()), max_messages: max_messages.max(2) }
    }

    pub async fn history(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.threads.read().await.get(thread_id).cloned().unwrap_or_default()
    }

    /// Appends one completed turn and trims the oldest turns past the cap.
    pub async fn append(&self, thread_id: &str, turn: Vec<ChatMessage>) {
        let mut threads = self.threads.write().await;
        let history = threads.entry(thread_id.to_string()).or_default();
        history.extend(turn);
        trim_to_turn_boundary(history, self.max_messages);
    }

    pub async fn clear(&self, thread_id: &str) -> bool {
        self.threads.write().await.remove(thread_id).is_some()
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

/// Drops whole leading turns so the history never starts with an orphaned tool result.
fn trim_to_turn_boundary(history: &mut Vec<ChatMessage>, max_messages: usize) {
    if history.len() <= max_messages {
        return;
    }

    let overflow = history.len() - max_messages;
    let cut = history
        .iter()
        .enumerate()
        .skip(overflow)
        .find(|(_, message)| message.role == Role::User)
        .map_or(history.len(), |(index, _)| index);
    history.drain(..cut);
}

#[cfg(test)]
mod tests {
    use super::ConversationStore;
    use crate::llm::{ChatMessage, Role, ToolCall};

    fn tool_turn(question: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(question),
            ChatMessage {
                role: Role::Assistant,
                content: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "get_all_cars".to_string(),
                    arguments: serde_json::json!({}),
                }],
                tool_call_id: None,
            },
            ChatMessage::tool_result("call_1", "[]"),
            ChatMessage::assistant("We have no cars right now."),
        ]
    }

    #[tokio::test]
    async fn threads_are_isolated() {
        let store = ConversationStore::new(10);
        store.append("a", vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]).await;
        store.append("b", vec![ChatMessage::user("yo")]).await;

        assert_eq!(store.history("a").await.len(), 2);
        assert_eq!(store.history("b").await.len(), 1);
        assert!(store.history("missing").await.is_empty());
        assert_eq!(store.thread_count().await, 2);
    }

    #[tokio::test]
    async fn trimming_keeps_whole_turns() {
        let store = ConversationStore::new(6);
        store.append("t", tool_turn("first")).await;
        store.append("t", tool_turn("second")).await;

        let history = store.history("t").await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn clear_forgets_a_thread() {
        let store = ConversationStore::new(4);
        store.append("t", vec![ChatMessage::user("hi")]).await;

        assert!(store.clear("t").await);
        assert!(!store.clear("t").await);
        assert!(store.history("t").await.is_empty());
    }
}
