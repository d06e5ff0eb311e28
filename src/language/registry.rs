//! The variable registry shared by the parser, the evaluator, and the
//! runtime session.

use indexmap::IndexMap;
use serde::Serialize;

use crate::language::Value;

/// Ordered mapping from variable name to current value. Created once at
/// compile time and then mutated by user answers and code-block execution
/// for the lifetime of a procedure instance. Iteration order is insertion
/// order, so serialized output and debugging views follow the order in
/// which variables appear in the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Registry {
    entries: IndexMap<String, Value>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            entries: IndexMap::new(),
        }
    }

    /// Pre-declare a variable found by scanning the source text. An
    /// existing entry is left untouched so that a later duplicate mention
    /// does not clobber a value seeded by a code block.
    pub fn declare(&mut self, name: &str) {
        self.entries
            .entry(name.to_string())
            .or_insert(Value::Empty);
    }

    /// Set a variable, creating it if absent.
    pub fn set(&mut self, name: &str, value: Value) {
        self.entries
            .insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_preserves_existing_values() {
        let mut registry = Registry::new();
        registry.declare("name");
        assert_eq!(registry.get("name"), Some(&Value::Empty));

        registry.set("name", Value::Text("Bob".to_string()));
        registry.declare("name");
        assert_eq!(registry.get("name"), Some(&Value::Text("Bob".to_string())));
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut registry = Registry::new();
        registry.declare("zebra");
        registry.declare("apple");
        registry.set("mango", Value::Number(1.0));

        let names: Vec<&str> = registry
            .iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["zebra", "apple", "mango"]);
    }
}
