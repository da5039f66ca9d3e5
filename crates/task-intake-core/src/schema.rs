//! Target schemas: the data fields a project's labeling config expects.
//!
//! A [`TargetSchema`] is derived from a labeling config: every object tag
//! that reads its input from the task (`value="$field"`) declares one data
//! field, typed by the tag it belongs to.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

use crate::error::ValidationFailure;

/// The kind of value a schema field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Image,
    Audio,
    Video,
    Generic,
}

impl FieldKind {
    /// Maps a labeling-config tag name onto a field kind.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "text" | "hypertext" => FieldKind::Text,
            "image" => FieldKind::Image,
            "audio" | "audioplus" => FieldKind::Audio,
            "video" => FieldKind::Video,
            _ => FieldKind::Generic,
        }
    }
}

/// Tags that may reference `$field` without being data inputs.
const VISUAL_TAGS: &[&str] = &["header", "style", "view"];

/// Field names and kinds declared by a project's labeling config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetSchema {
    fields: BTreeMap<String, FieldKind>,
}

impl TargetSchema {
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldKind)>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Parses a labeling config and collects its data fields.
    pub fn from_label_config(xml: &str) -> Result<Self, ValidationFailure> {
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut fields = BTreeMap::new();
        let mut seen_root = false;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    seen_root = true;
                    if let Some((field, kind)) = data_field_of(&e)? {
                        fields.entry(field).or_insert(kind);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ValidationFailure::new(format!(
                        "Invalid labeling config: {}",
                        e
                    )))
                }
                _ => {}
            }
        }
        if !seen_root {
            return Err(ValidationFailure::new(
                "Invalid labeling config: no elements found",
            ));
        }
        Ok(Self { fields })
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.fields.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when the config has at most one data field; any content can
    /// then be coerced into that field.
    pub fn is_single_field(&self) -> bool {
        self.fields.len() <= 1
    }

    /// The only field of a one-field schema.
    pub fn sole_field(&self) -> Option<&str> {
        if self.fields.len() == 1 {
            self.fields.keys().next().map(String::as_str)
        } else {
            None
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

fn data_field_of(e: &BytesStart<'_>) -> Result<Option<(String, FieldKind)>, ValidationFailure> {
    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    if VISUAL_TAGS.contains(&tag.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    let mut has_name = false;
    let mut field = None;
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| ValidationFailure::new(format!("Invalid labeling config: {}", err)))?;
        match attr.key.as_ref() {
            b"name" => has_name = true,
            b"value" => {
                let value = attr.unescape_value().map_err(|err| {
                    ValidationFailure::new(format!("Invalid labeling config: {}", err))
                })?;
                if let Some(name) = value.strip_prefix('$') {
                    if !name.is_empty() {
                        field = Some(name.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    Ok(match (has_name, field) {
        (true, Some(field)) => Some((field, FieldKind::from_tag(&tag))),
        _ => None,
    })
}

/// Resolves the target schema of a project.
pub trait SchemaProvider: Send + Sync {
    fn fields_of(&self, project_id: u64) -> Result<TargetSchema>;
}

/// Fixed project → schema table, typically built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    schemas: HashMap<u64, TargetSchema>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, project_id: u64, schema: TargetSchema) {
        self.schemas.insert(project_id, schema);
    }

    pub fn with(mut self, project_id: u64, schema: TargetSchema) -> Self {
        self.insert(project_id, schema);
        self
    }

    pub fn project_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.schemas.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl SchemaProvider for StaticSchemaProvider {
    fn fields_of(&self, project_id: u64) -> Result<TargetSchema> {
        self.schemas
            .get(&project_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Project {} has no labeling config", project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_object_tags() {
        let config = r#"
            <View>
              <Header value="$title"/>
              <Image name="img" value="$image"/>
              <Text name="txt" value="$text"/>
              <Choices name="label" toName="img">
                <Choice value="Cat"/>
                <Choice value="Dog"/>
              </Choices>
            </View>"#;
        let schema = TargetSchema::from_label_config(config).unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.kind_of("image"), Some(FieldKind::Image));
        assert_eq!(schema.kind_of("text"), Some(FieldKind::Text));
        assert!(!schema.contains("title"));
        assert!(!schema.is_single_field());
    }

    #[test]
    fn single_field_schema() {
        let schema =
            TargetSchema::from_label_config(r#"<View><Audio name="a" value="$audio"/></View>"#)
                .unwrap();
        assert!(schema.is_single_field());
        assert_eq!(schema.sole_field(), Some("audio"));
        assert_eq!(schema.kind_of("audio"), Some(FieldKind::Audio));
    }

    #[test]
    fn malformed_config_fails() {
        assert!(TargetSchema::from_label_config("<View><Image></View>").is_err());
        assert!(TargetSchema::from_label_config("").is_err());
    }

    #[test]
    fn static_provider_unknown_project() {
        let provider = StaticSchemaProvider::new().with(
            1,
            TargetSchema::from_fields([("text", FieldKind::Text)]),
        );
        assert!(provider.fields_of(1).is_ok());
        assert!(provider.fields_of(2).is_err());
    }
}
