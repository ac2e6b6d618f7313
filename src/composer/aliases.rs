//! Alternate casings for snake_case field names, so templates can address
//! `first_name` as `FirstName` or `firstName` too.

use serde_json::{Map, Value};

pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Copy of `fields` with PascalCase and camelCase aliases added next to every
/// original key. Original keys win over aliases.
pub fn with_aliases(fields: &Map<String, Value>) -> Map<String, Value> {
    let mut aliased = fields.clone();
    for (name, value) in fields {
        for alias in [pascal_case(name), camel_case(name)] {
            if !alias.is_empty() && !aliased.contains_key(&alias) {
                aliased.insert(alias, value.clone());
            }
        }
    }
    aliased
}
