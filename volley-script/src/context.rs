//! Per-transaction correlation state

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Values extracted from earlier responses of one transaction instance.
/// Created when the transaction starts and dropped when it ends; owned by
/// the single worker running it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationContext {
    values: BTreeMap<String, JsonValue>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: JsonValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Template data: `vars` overlaid with every extracted value
    pub fn template_data(&self, vars: &Map<String, JsonValue>) -> Map<String, JsonValue> {
        let mut data = vars.clone();
        for (name, value) in &self.values {
            data.insert(name.clone(), value.clone());
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracted_values_overlay_vars() {
        let mut context = CorrelationContext::new();
        context.insert("order_id", json!(42));

        let mut vars = Map::new();
        vars.insert("base_url".to_string(), json!("http://localhost:8002"));

        let data = context.template_data(&vars);
        assert_eq!(data["order_id"], 42);
        assert_eq!(data["base_url"], "http://localhost:8002");
        assert_eq!(context.len(), 1);
    }
}
