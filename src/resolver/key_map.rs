//! External-to-internal field name maps derived from an endpoint's payload template.
//!
//! Derivation order:
//! 1. an explicit `{"keyMap": {"external": "Internal.Name"}}` object in the template
//! 2. inversion of a JSON template whose string values are single placeholders
//!    (`{{ K }}`, `${K}` or `{K}`), keyed by bare name and dotted path
//! 3. a text scan for `"external": placeholder` pairs when the template is not JSON
//! 4. otherwise an empty map

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::key_bag::KeyBag;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyMap {
    entries: Vec<(String, String)>,
}

static PLACEHOLDER_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static PAIR_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn placeholder_patterns() -> &'static [Regex] {
    PLACEHOLDER_PATTERNS.get_or_init(|| {
        [
            r"^\s*\{\{\{?\s*([A-Za-z0-9_.\[\]]+)\s*\}?\}\}\s*$",
            r"^\s*\$\{\s*([A-Za-z0-9_.\[\]]+)\s*\}\s*$",
            r"^\s*\{\s*([A-Za-z0-9_.\[\]]+)\s*\}\s*$",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

fn pair_pattern() -> Option<&'static Regex> {
    PAIR_PATTERN
        .get_or_init(|| {
            Regex::new(
                r#""([A-Za-z0-9_]+)"\s*:\s*"?\s*(\{\{\{?\s*[A-Za-z0-9_.\[\]]+\s*\}?\}\}|\$\{\s*[A-Za-z0-9_.\[\]]+\s*\}|\{\s*[A-Za-z0-9_.\[\]]+\s*\})"#,
            )
            .ok()
        })
        .as_ref()
}

/// Internal name referenced by a string that is exactly one placeholder
pub fn placeholder_name(text: &str) -> Option<String> {
    placeholder_patterns()
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive(template: &str) -> Self {
        if template.trim().is_empty() {
            return Self::new();
        }

        match serde_json::from_str::<Value>(template) {
            Ok(json) => {
                if let Some(explicit) = Self::explicit(&json) {
                    return explicit;
                }
                let mut map = Self::new();
                map.invert(&json, "");
                if !map.is_empty() {
                    return map;
                }
                Self::scan(template)
            }
            Err(_) => Self::scan(template),
        }
    }

    fn explicit(json: &Value) -> Option<Self> {
        let object = json
            .as_object()?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("keyMap"))?
            .1
            .as_object()?;

        let mut map = Self::new();
        for (external, internal) in object {
            if let Some(internal) = internal.as_str().filter(|s| !s.trim().is_empty()) {
                map.push(external, internal.trim());
            }
        }
        (!map.is_empty()).then_some(map)
    }

    fn invert(&mut self, node: &Value, path: &str) {
        match node {
            Value::Object(object) => {
                for (name, child) in object {
                    let child_path = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{path}.{name}")
                    };
                    match child {
                        Value::String(text) => {
                            if let Some(internal) = placeholder_name(text) {
                                self.push(name, &internal);
                                if child_path != *name {
                                    self.push(&child_path, &internal);
                                }
                            }
                        }
                        _ => self.invert(child, &child_path),
                    }
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.invert(item, &format!("{path}[{i}]"));
                }
            }
            _ => {}
        }
    }

    fn scan(template: &str) -> Self {
        let mut map = Self::new();
        if let Some(pattern) = pair_pattern() {
            for caps in pattern.captures_iter(template) {
                let (Some(external), Some(placeholder)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                if let Some(internal) = placeholder_name(placeholder.as_str()) {
                    map.push(external.as_str(), &internal);
                }
            }
        }
        map
    }

    /// First mapping for an external name wins
    fn push(&mut self, external: &str, internal: &str) {
        if !self
            .entries
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(external))
        {
            self.entries
                .push((external.to_string(), internal.to_string()));
        }
    }

    pub fn internal_for(&self, external: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(external))
            .map(|(_, internal)| internal.as_str())
    }

    /// Bare external names, for collecting fields that are not identifier-like
    pub fn external_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(external, _)| !external.contains('.') && !external.contains('['))
            .map(|(external, _)| external.clone())
            .collect()
    }

    /// Copy values found under external names into their internal names,
    /// leaving internal names that are already present alone
    pub fn apply(&self, bag: &mut KeyBag) {
        for (external, internal) in &self.entries {
            if bag.contains(internal) {
                continue;
            }
            if let Some(value) = bag.get(external).cloned() {
                bag.insert(internal, value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
