//! The dealership assistant.
//!
//! A guest message runs through [`runtime::AgentRuntime`]: the model sees the system prompt
//! and the thread history, may call the catalog, negotiation and knowledge-base tools, and
//! answers once it has what it needs.
//!
//! The model never decides a price. Every offer goes through `negotiate_price`, which
//! delegates to the transactional negotiation engine in `rise-core`.

pub mod conversation;
pub mod llm;
pub mod prompt;
pub mod registry;
pub mod retrieval;
pub mod runtime;
pub mod tools;

pub use conversation::ConversationStore;
pub use llm::{ChatMessage, LlmClient, LlmError, OpenAiCompatibleClient, Role, ToolCall};
pub use prompt::{load_system_prompt, PromptError};
pub use registry::{ClientRegistry, QdrantStoreFactory, VectorStoreFactory, VectorStores};
pub use retrieval::{
    Document, EmbeddingClient, OpenAiEmbeddingClient, QdrantStore, RetrievalError, VectorStore,
};
pub use runtime::{AgentError, AgentReply, AgentRuntime, AgentSettings};
pub use tools::{dealership_tools, LookupInformationTool, Tool, ToolRegistry};
