use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{AbpathError, Result};
use crate::model::{lenient, ContentTree, Section, SectionType};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub total_sections: u32,
    #[serde(default)]
    pub ap_sections: u32,
    #[serde(default)]
    pub cp_sections: u32,
    #[serde(default)]
    pub source_files: u32,
    #[serde(default)]
    pub description: String,
}

/// The static content-specification document: the section tree plus its metadata block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSpecDocument {
    pub tree: ContentTree,
    pub metadata: Metadata,
}

impl ContentSpecDocument {
    pub fn new(tree: ContentTree, metadata: Metadata) -> Self {
        Self { tree, metadata }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let value: Value = serde_json::from_reader(reader)?;
        Self::from_value(value)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let doc = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.as_ref().display(),
            sections = doc.tree.len(),
            "loaded content specifications"
        );
        Ok(doc)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let mut root = match value {
            Value::Object(map) => map,
            _ => return Err(AbpathError::InvalidDocument("document root must be an object")),
        };
        let specs = match root.remove("content_specifications") {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AbpathError::InvalidDocument(
                    "content_specifications must be an object",
                ))
            }
            None => return Err(AbpathError::InvalidDocument("missing content_specifications")),
        };
        let mut sections = sections_of_kind(&specs, "ap_sections", SectionType::Ap);
        sections.extend(sections_of_kind(&specs, "cp_sections", SectionType::Cp));
        let metadata = root
            .remove("metadata")
            .and_then(|raw| serde_json::from_value(raw).ok())
            .unwrap_or_default();
        Ok(Self {
            tree: ContentTree::new(sections),
            metadata,
        })
    }

    /// Serializes back into the `content_specifications` / `metadata` shape.
    pub fn to_json_value(&self) -> Value {
        let ap: Vec<&Section> = self.tree.sections_of(SectionType::Ap).collect();
        let cp: Vec<&Section> = self.tree.sections_of(SectionType::Cp).collect();
        json!({
            "content_specifications": {
                "ap_sections": ap,
                "cp_sections": cp,
            },
            "metadata": self.metadata,
        })
    }
}

fn sections_of_kind(specs: &Map<String, Value>, field: &str, kind: SectionType) -> Vec<Section> {
    let raw = specs.get(field).cloned().unwrap_or(Value::Null);
    let declared = raw.as_array().map(|entries| entries.len()).unwrap_or(0);
    let mut sections: Vec<Section> = lenient::elements(raw);
    if sections.len() < declared {
        warn!(
            field,
            skipped = declared - sections.len(),
            "skipped unreadable sections"
        );
    }
    for section in &mut sections {
        section.kind = kind;
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Designation;

    const SAMPLE: &str = r#"{
        "content_specifications": {
            "ap_sections": [
                {"section": 2, "title": "Breast", "type": "ap", "items": [
                    {"title": "Fibroadenoma", "designation": "C"}
                ]},
                {"section": 1, "title": "Skin", "type": "cp", "items": []}
            ],
            "cp_sections": [
                {"section": 1, "title": "Chemistry", "subsections": [
                    {"letter": "A", "title": "Lipids", "items": [
                        {"title": "Cholesterol", "designation": "AR"}
                    ]}
                ]}
            ]
        },
        "metadata": {"total_sections": 3, "ap_sections": 2, "cp_sections": 1, "source_files": 2, "description": "sample"}
    }"#;

    #[test]
    fn loads_sections_in_canonical_order() {
        let doc = ContentSpecDocument::from_json_str(SAMPLE).unwrap();
        let keys: Vec<String> = doc
            .tree
            .sections()
            .iter()
            .map(|s| s.key().to_string())
            .collect();
        assert_eq!(keys, vec!["ap-1", "ap-2", "cp-1"]);
        assert_eq!(doc.metadata.total_sections, 3);
        assert_eq!(doc.metadata.description, "sample");
        let chemistry = &doc.tree.sections()[2];
        assert_eq!(
            chemistry.subsections[0].items[0].designation,
            Some(Designation::AdvancedResident)
        );
    }

    #[test]
    fn list_membership_overrides_declared_type() {
        let doc = ContentSpecDocument::from_json_str(SAMPLE).unwrap();
        let skin = doc
            .tree
            .sections()
            .iter()
            .find(|s| s.title == "Skin")
            .unwrap();
        assert_eq!(skin.kind, SectionType::Ap);
    }

    #[test]
    fn missing_specifications_is_fatal() {
        let err = ContentSpecDocument::from_json_str(r#"{"metadata": {}}"#).unwrap_err();
        assert!(matches!(err, AbpathError::InvalidDocument(_)));
        let err = ContentSpecDocument::from_json_str(r#"{"content_specifications": []}"#)
            .unwrap_err();
        assert!(matches!(err, AbpathError::InvalidDocument(_)));
        let err = ContentSpecDocument::from_json_str("[]").unwrap_err();
        assert!(matches!(err, AbpathError::InvalidDocument(_)));
    }

    #[test]
    fn missing_lists_and_metadata_default_to_empty() {
        let doc =
            ContentSpecDocument::from_json_str(r#"{"content_specifications": {"ap_sections": null}}"#)
                .unwrap();
        assert!(doc.tree.is_empty());
        assert_eq!(doc.metadata, Metadata::default());
    }

    #[test]
    fn round_trips_through_original_shape() {
        let doc = ContentSpecDocument::from_json_str(SAMPLE).unwrap();
        let value = doc.to_json_value();
        let reloaded = ContentSpecDocument::from_value(value).unwrap();
        assert_eq!(doc, reloaded);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, SAMPLE.as_bytes()).unwrap();
        let doc = ContentSpecDocument::load_json(file.path()).unwrap();
        assert_eq!(doc.tree.len(), 3);
    }
}
