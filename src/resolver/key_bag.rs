//! Key bags: flat, ordered maps of identifier-like fields pulled out of an
//! arbitrary JSON body.
//!
//! Every collected field is stored twice, under its bare name and under its
//! dotted path (`ClearanceRequest.externalRequestId`, `Result[0].Id`). The first
//! occurrence of a key wins. Lookups never fail; they return `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A field collected regardless of its suffix, optionally stored under an alias too
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialField {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl SpecialField {
    pub fn new(name: &str, alias: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            alias: alias.map(str::to_string),
        }
    }
}

/// Which properties end up in a key bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBagRules {
    /// Case-insensitive name suffixes marking a property as an identifier
    pub identifier_suffixes: Vec<String>,
    pub special_fields: Vec<SpecialField>,
}

impl Default for KeyBagRules {
    fn default() -> Self {
        Self {
            identifier_suffixes: vec!["id".to_string()],
            special_fields: vec![
                SpecialField::new("indexNo", Some("IndexNo")),
                SpecialField::new("IndexNumber", None),
                SpecialField::new("ReferenceNumber", None),
            ],
        }
    }
}

impl KeyBagRules {
    fn special_field(&self, name: &str) -> Option<&SpecialField> {
        self.special_fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    fn is_identifier(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.identifier_suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyBag {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl KeyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `root` and collect every identifier-like property. `extra_names` are
    /// collected as well, whatever their suffix (external names of a key map).
    pub fn collect(root: &Value, rules: &KeyBagRules, extra_names: &[String]) -> Self {
        let mut bag = Self::new();
        bag.walk(root, "", rules, extra_names);
        bag
    }

    fn walk(&mut self, node: &Value, path: &str, rules: &KeyBagRules, extra_names: &[String]) {
        match node {
            Value::Object(map) => {
                let child_path = |name: &str| {
                    if path.is_empty() {
                        name.to_string()
                    } else {
                        format!("{path}.{name}")
                    }
                };

                // Scalars of this level first, so shallower fields win over nested ones
                for (name, child) in map {
                    let child_path = child_path(name);
                    if let Some(value) = coerce_scalar(child) {
                        if let Some(special) = rules.special_field(name) {
                            self.insert(name, value.clone());
                            if let Some(alias) = &special.alias {
                                self.insert(alias, value.clone());
                            }
                            self.insert(&child_path, value);
                        } else if rules.is_identifier(name)
                            || extra_names.iter().any(|extra| extra.eq_ignore_ascii_case(name))
                        {
                            self.insert(name, value.clone());
                            self.insert(&child_path, value);
                        }
                    }
                }

                for (name, child) in map {
                    if child.is_object() || child.is_array() {
                        self.walk(child, &child_path(name), rules, extra_names);
                    }
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.walk(item, &format!("{path}[{i}]"), rules, extra_names);
                }
            }
            _ => {}
        }
    }

    /// Insert unless the key is already present (first occurrence wins)
    pub fn insert(&mut self, key: &str, value: Value) -> bool {
        let lower = key.to_ascii_lowercase();
        if self.index.contains_key(&lower) {
            return false;
        }
        self.index.insert(lower, self.entries.len());
        self.entries.push((key.to_string(), value));
        true
    }

    /// Exact key, or the first key ending in `.name`, case-insensitively
    pub fn get(&self, name: &str) -> Option<&Value> {
        let lower = name.to_ascii_lowercase();
        if let Some(&i) = self.index.get(&lower) {
            return Some(&self.entries[i].1);
        }
        let suffix = format!(".{lower}");
        self.entries
            .iter()
            .find(|(key, _)| key.to_ascii_lowercase().ends_with(&suffix))
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Integer value, if the stored value is (or was coerced to) a number
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// First positive integer among `names`
    pub fn first_positive_i64(&self, names: &[&str]) -> Option<i64> {
        names
            .iter()
            .filter_map(|name| self.get_i64(name))
            .find(|value| *value > 0)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

/// Numbers and numeric strings become integers; other non-empty strings stay strings
fn coerce_scalar(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Value::from)
            .or_else(|| Some(value.clone())),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else if let Ok(parsed) = trimmed.parse::<i64>() {
                Some(Value::from(parsed))
            } else {
                Some(Value::String(s.clone()))
            }
        }
        _ => None,
    }
}
