use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::error;

use super::{arguments, required_text, Tool};
use crate::registry::VectorStores;
use crate::retrieval::join_documents;

pub const NO_INFORMATION: &str = "No information available for the query.";

/// Answers dealership questions (hours, financing, warranty) from the knowledge base.
pub struct LookupInformationTool {
    stores: Option<Arc<VectorStores>>,
    collection: String,
    top_k: u32,
}

impl LookupInformationTool {
    pub fn new(stores: Arc<VectorStores>, collection: impl Into<String>, top_k: u32) -> Self {
        Self { stores: Some(stores), collection: collection.into(), top_k }
    }

    /// A lookup that always reports that nothing is known.
    pub fn unavailable() -> Self {
        Self { stores: None, collection: String::new(), top_k: 0 }
    }

    async fn lookup(&self, stores: &VectorStores, query: &str) -> Result<String> {
        let store = stores.get(&self.collection).await?;
        let documents = store.similarity_search(query, self.top_k).await?;
        if documents.is_empty() {
            return Ok(NO_INFORMATION.to_string());
        }
        Ok(join_documents(&documents))
    }
}

#[async_trait]
impl Tool for LookupInformationTool {
    fn name(&self) -> &'static str {
        "lookup_informations"
    }

    fn description(&self) -> &'static str {
        "Searches the dealership knowledge base and returns the most relevant passages."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look up" },
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args = arguments(&input)?;
        let query = required_text(&args, "query")?;

        let Some(stores) = &self.stores else {
            return Ok(Value::String(NO_INFORMATION.to_string()));
        };

        match self.lookup(stores, &query).await {
            Ok(text) => Ok(Value::String(text)),
            Err(failure) => {
                error!(
                    event_name = "agent.lookup.failed",
                    collection = %self.collection,
                    error = %failure,
                    "knowledge base lookup failed"
                );
                Ok(Value::String(format!(
                    "An error occurred while looking up information: {failure}"
                )))
            }
        }
    }
}
