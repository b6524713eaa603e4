use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rise_core::catalog::CarCatalog;
use rise_core::negotiation::Negotiator;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::llm::ToolDefinition;

pub mod catalog;
pub mod lookup;
pub mod negotiation;

pub use catalog::{CatalogSearch, CatalogSearchTool};
pub use lookup::LookupInformationTool;
pub use negotiation::NegotiatePriceTool;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the argument object.
    fn parameters(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub async fn dispatch(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| anyhow!("unknown tool `{name}`"))?;
        tool.execute(input).await
    }
}

/// Every tool the dealership assistant exposes to the model.
pub fn dealership_tools(
    catalog: Arc<dyn CarCatalog>,
    negotiator: Negotiator,
    lookup: LookupInformationTool,
) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    for search in CatalogSearch::ALL {
        registry.register(CatalogSearchTool::new(search, Arc::clone(&catalog)));
    }
    registry.register(NegotiatePriceTool::new(negotiator));
    registry.register(lookup);
    registry
}

pub(crate) fn arguments(input: &Value) -> Result<Map<String, Value>> {
    match input {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(raw) => bail!("arguments must be a JSON object, got `{raw}`"),
        other => bail!("arguments must be a JSON object, got {other}"),
    }
}

fn present<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|value| !value.is_null())
}

pub(crate) fn optional_text(args: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match present(args, key) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => bail!("`{key}` must be a string, got {other}"),
    }
}

pub(crate) fn required_text(args: &Map<String, Value>, key: &str) -> Result<String> {
    optional_text(args, key)?.ok_or_else(|| anyhow!("missing required argument `{key}`"))
}

pub(crate) fn optional_integer(args: &Map<String, Value>, key: &str) -> Result<Option<i64>> {
    let Some(value) = present(args, key) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number.as_f64().filter(|float| float.fract() == 0.0).map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.map(Some).ok_or_else(|| anyhow!("`{key}` must be an integer, got {value}"))
}

pub(crate) fn required_integer(args: &Map<String, Value>, key: &str) -> Result<i64> {
    optional_integer(args, key)?.ok_or_else(|| anyhow!("missing required argument `{key}`"))
}

pub(crate) fn optional_year(args: &Map<String, Value>, key: &str) -> Result<Option<i32>> {
    optional_integer(args, key)?
        .map(|year| i32::try_from(year).map_err(|_| anyhow!("`{key}` is out of range")))
        .transpose()
}

pub(crate) fn required_year(args: &Map<String, Value>, key: &str) -> Result<i32> {
    optional_year(args, key)?.ok_or_else(|| anyhow!("missing required argument `{key}`"))
}

/// Reads a money amount from a JSON number or numeric string without going through `f64`.
pub(crate) fn required_decimal(args: &Map<String, Value>, key: &str) -> Result<Decimal> {
    let value = present(args, key).ok_or_else(|| anyhow!("missing required argument `{key}`"))?;
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().trim_start_matches('$').replace(',', ""),
        other => bail!("`{key}` must be a number, got {other}"),
    };

    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| anyhow!("`{key}` must be a number, got `{raw}`"))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use super::{arguments, optional_integer, required_decimal, Tool, ToolRegistry};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echoes its input."
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::default();
        registry.register(Echo);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.definitions()[0].name, "echo");
        assert_eq!(registry.dispatch("echo", json!({"a": 1})).await.expect("echo"), json!({"a": 1}));

        let error = registry.dispatch("missing", json!({})).await.expect_err("unknown tool");
        assert!(error.to_string().contains("unknown tool `missing`"));
    }

    #[test]
    fn decimal_arguments_keep_exact_cents() {
        let args = arguments(&json!({
            "a": 45000.10,
            "b": "47,600.25",
            "c": "$100",
            "d": 4.5e4,
            "e": true
        }))
        .expect("object");

        assert_eq!(required_decimal(&args, "a").expect("a"), Decimal::new(4_500_010, 2));
        assert_eq!(required_decimal(&args, "b").expect("b"), Decimal::new(4_760_025, 2));
        assert_eq!(required_decimal(&args, "c").expect("c"), Decimal::new(100, 0));
        assert_eq!(required_decimal(&args, "d").expect("d"), Decimal::new(45_000, 0));
        assert!(required_decimal(&args, "e").is_err());
        assert!(required_decimal(&args, "missing").is_err());
    }

    #[test]
    fn integer_arguments_accept_whole_floats_and_strings() {
        let args = arguments(&json!({ "a": 3.0, "b": "7", "c": 2.5, "d": null })).expect("object");

        assert_eq!(optional_integer(&args, "a").expect("a"), Some(3));
        assert_eq!(optional_integer(&args, "b").expect("b"), Some(7));
        assert!(optional_integer(&args, "c").is_err());
        assert_eq!(optional_integer(&args, "d").expect("d"), None);
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        assert!(arguments(&json!("{broken")).is_err());
        assert!(arguments(&Value::Null).expect("null is empty").is_empty());
    }
}
