//! Best-effort reconciliation of task keys against a target schema.
//!
//! Files often name their columns slightly differently from what the
//! labeling config expects (`text` vs `question`). A [`KeyPolicy`] copies
//! values into the expected keys without removing the originals, then
//! coerces values into shapes the schema accepts.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use crate::models::TaskData;
use crate::schema::{FieldKind, TargetSchema};

fn default_enabled() -> bool {
    true
}

fn default_mirror() -> Vec<(String, String)> {
    vec![
        ("text".to_string(), "question".to_string()),
        ("question".to_string(), "text".to_string()),
    ]
}

fn default_sole_field_aliases() -> Vec<String> {
    ["question", "text", "image", "audio", "video"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Which alias copies and coercions are applied to every task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct KeyPolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// `(from, to)` pairs: when the schema expects `to`, the task lacks it
    /// and has `from`, the value of `from` is copied into `to`.
    #[serde(default = "default_mirror")]
    pub mirror: Vec<(String, String)>,
    /// Tried in order when a one-field schema's field is missing.
    #[serde(default = "default_sole_field_aliases")]
    pub sole_field_aliases: Vec<String>,
    #[serde(default = "default_enabled")]
    pub coerce_values: bool,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            mirror: default_mirror(),
            sole_field_aliases: default_sole_field_aliases(),
            coerce_values: true,
        }
    }
}

impl KeyPolicy {
    /// A policy that leaves tasks untouched.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Column names that identify a header row for `schema`: its fields,
    /// plus the keys this policy would copy into them.
    pub fn header_names(&self, schema: &TargetSchema) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = schema.field_names().map(str::to_string).collect();
        if !self.enabled {
            return names;
        }
        for (from, to) in &self.mirror {
            if schema.contains(to) {
                names.insert(from.clone());
            }
        }
        if schema.sole_field().is_some() {
            names.extend(self.sole_field_aliases.iter().cloned());
        }
        names
    }

    pub fn apply(&self, data: &mut TaskData, schema: &TargetSchema) {
        if !self.enabled {
            return;
        }

        for (from, to) in &self.mirror {
            if schema.contains(to) && !data.contains_key(to) {
                if let Some(value) = data.get(from).cloned() {
                    data.insert(to.clone(), value);
                }
            }
        }

        if let Some(sole) = schema.sole_field() {
            if !data.contains_key(sole) {
                let found = self
                    .sole_field_aliases
                    .iter()
                    .find_map(|alias| data.get(alias).cloned());
                if let Some(value) = found {
                    data.insert(sole.to_string(), value);
                }
            }
        }

        if self.coerce_values {
            coerce(data, schema);
        }
    }
}

/// `null` becomes `""`; a one-element list becomes its element, except for
/// image fields, which accept lists.
fn coerce(data: &mut TaskData, schema: &TargetSchema) {
    for (field, kind) in schema.fields() {
        let Some(value) = data.get_mut(field) else {
            continue;
        };
        let replacement = match value {
            Value::Null => Some(Value::String(String::new())),
            Value::Array(items) if kind != FieldKind::Image && items.len() == 1 => {
                Some(items[0].clone())
            }
            _ => None,
        };
        if let Some(replacement) = replacement {
            *value = replacement;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> TaskData {
        value.as_object().unwrap().clone()
    }

    fn schema(fields: &[(&str, FieldKind)]) -> TargetSchema {
        TargetSchema::from_fields(fields.iter().map(|(k, v)| (*k, *v)))
    }

    #[test]
    fn mirrors_text_into_question_keeping_original() {
        let s = schema(&[("question", FieldKind::Text), ("answer", FieldKind::Text)]);
        let mut d = data(json!({"text": "why?"}));
        KeyPolicy::default().apply(&mut d, &s);
        assert_eq!(d["question"], json!("why?"));
        assert_eq!(d["text"], json!("why?"));
    }

    #[test]
    fn mirrors_question_into_text() {
        let s = schema(&[("text", FieldKind::Text), ("label", FieldKind::Generic)]);
        let mut d = data(json!({"question": "q"}));
        KeyPolicy::default().apply(&mut d, &s);
        assert_eq!(d["text"], json!("q"));
    }

    #[test]
    fn sole_field_takes_first_alias() {
        let s = schema(&[("img", FieldKind::Image)]);
        let mut d = data(json!({"image": "a.png", "text": "caption"}));
        KeyPolicy::default().apply(&mut d, &s);
        assert_eq!(d["img"], json!("caption"));
    }

    #[test]
    fn existing_key_is_not_overwritten() {
        let s = schema(&[("question", FieldKind::Text)]);
        let mut d = data(json!({"question": "keep", "text": "other"}));
        KeyPolicy::default().apply(&mut d, &s);
        assert_eq!(d["question"], json!("keep"));
    }

    #[test]
    fn coerces_null_and_single_element_lists() {
        let s = schema(&[
            ("text", FieldKind::Text),
            ("audio", FieldKind::Audio),
            ("image", FieldKind::Image),
        ]);
        let mut d = data(json!({"text": null, "audio": ["a.wav"], "image": ["a.png"]}));
        KeyPolicy::default().apply(&mut d, &s);
        assert_eq!(d["text"], json!(""));
        assert_eq!(d["audio"], json!("a.wav"));
        assert_eq!(d["image"], json!(["a.png"]));
    }

    #[test]
    fn fields_outside_schema_are_left_alone() {
        let s = schema(&[("text", FieldKind::Text)]);
        let mut d = data(json!({"text": "t", "extra": null}));
        KeyPolicy::default().apply(&mut d, &s);
        assert_eq!(d["extra"], Value::Null);
    }

    #[test]
    fn header_names_include_aliases() {
        let policy = KeyPolicy::default();
        let names = policy.header_names(&schema(&[("question", FieldKind::Text)]));
        assert!(names.contains("question"));
        assert!(names.contains("text"));
        assert!(names.contains("image"));

        let multi = schema(&[("text", FieldKind::Text), ("label", FieldKind::Generic)]);
        let names = policy.header_names(&multi);
        assert!(names.contains("question"));
        assert!(!names.contains("image"));

        let names = KeyPolicy::disabled().header_names(&schema(&[("question", FieldKind::Text)]));
        assert_eq!(names.len(), 1);
        assert!(policy.header_names(&TargetSchema::default()).is_empty());
    }

    #[test]
    fn disabled_policy_is_a_no_op() {
        let s = schema(&[("question", FieldKind::Text)]);
        let mut d = data(json!({"text": null}));
        KeyPolicy::disabled().apply(&mut d, &s);
        assert_eq!(d, data(json!({"text": null})));
    }
}
