use proptest::prelude::*;
use serde_json::{json, Value};

/// Positive database-style ids
pub fn id_strategy() -> impl Strategy<Value = i64> {
    1i64..=9_999_999
}

pub fn id_pair_strategy() -> impl Strategy<Value = (i64, i64)> {
    (id_strategy(), id_strategy())
}

/// Field names that are not identifiers, used as noise around real ids
pub fn noise_key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{3,10}".prop_filter("must not look like an identifier", |key| {
        !key.ends_with("id") && key != "indexno"
    })
}

/// Request bodies in the shapes providers actually receive: flat, nested
/// under a wrapper, or carrying only a composite reference
pub fn request_body_strategy() -> impl Strategy<Value = (i64, i64, Value)> {
    (
        id_pair_strategy(),
        prop::collection::vec((noise_key_strategy(), "[A-Za-z ]{0,12}"), 0..4),
        0u8..3,
    )
        .prop_map(|((subject_id, program_id), noise, shape)| {
            let mut extra = serde_json::Map::new();
            for (key, value) in noise {
                extra.insert(key, Value::String(value));
            }
            let body = match shape {
                0 => json!({"SubjectId": subject_id, "ProgramId": program_id, "extra": extra}),
                1 => json!({"payload": {"candidate": {"subjectId": subject_id.to_string(), "programId": program_id}}, "extra": extra}),
                _ => json!({"ReferenceNumber": format!("{program_id}_{subject_id}"), "extra": extra}),
            };
            (subject_id, program_id, body)
        })
}
