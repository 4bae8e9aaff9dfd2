use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AbpathError, Result};

static RESIDENT_TOPICS_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^Topics for Anatomic Pathology Residents?\s*:?\s*").expect("valid regex")
});
static LEADING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^The\s+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Designation {
    #[serde(rename = "C")]
    Core,
    #[serde(rename = "AR")]
    AdvancedResident,
    #[serde(rename = "F")]
    Fellow,
}

impl Designation {
    pub const ALL: [Designation; 3] = [
        Designation::Core,
        Designation::AdvancedResident,
        Designation::Fellow,
    ];

    /// Exact document codes only; `FromStr` also accepts spelled-out names.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "C" => Some(Designation::Core),
            "AR" => Some(Designation::AdvancedResident),
            "F" => Some(Designation::Fellow),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Designation::Core => "C",
            Designation::AdvancedResident => "AR",
            Designation::Fellow => "F",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Designation::Core => "Core",
            Designation::AdvancedResident => "Advanced Resident",
            Designation::Fellow => "Fellow",
        }
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.name(), self.code())
    }
}

impl fmt::Display for Designation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Designation {
    type Err = AbpathError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CORE" => Ok(Designation::Core),
            "AR" | "ADVANCED" | "ADVANCED RESIDENT" => Ok(Designation::AdvancedResident),
            "F" | "FELLOW" => Ok(Designation::Fellow),
            _ => Err(AbpathError::UnknownDesignation(s.to_string())),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    #[default]
    Ap,
    Cp,
}

impl SectionType {
    pub const ALL: [SectionType; 2] = [SectionType::Ap, SectionType::Cp];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Ap => "ap",
            SectionType::Cp => "cp",
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            SectionType::Ap => "AP",
            SectionType::Cp => "CP",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionType {
    type Err = AbpathError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ap" | "anatomic" => Ok(SectionType::Ap),
            "cp" | "clinical" => Ok(SectionType::Cp),
            _ => Err(AbpathError::UnknownSectionType(s.to_string())),
        }
    }
}

/// Stable identifier of a top-level section, rendered as `ap-3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionKey {
    pub kind: SectionType,
    pub number: u32,
}

impl SectionKey {
    pub fn new(kind: SectionType, number: u32) -> Self {
        Self { kind, number }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.number)
    }
}

impl FromStr for SectionKey {
    type Err = AbpathError;

    /// Accepts `ap-3` as well as the `AP_3` form used by the category selector.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AbpathError::InvalidSectionKey(s.to_string());
        let (kind, number) = s.trim().split_once(['-', '_']).ok_or_else(invalid)?;
        let kind = kind.parse::<SectionType>().map_err(|_| invalid())?;
        let number = number.trim().parse::<u32>().map_err(|_| invalid())?;
        Ok(Self { kind, number })
    }
}

impl Serialize for SectionKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SectionKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawItem", into = "RawItem")]
pub struct Item {
    pub number: Option<u32>,
    pub letter: Option<String>,
    pub roman: Option<String>,
    pub title: String,
    pub designation: Option<Designation>,
    /// Designation text that is none of `C`, `AR`, `F`. Such items count as
    /// designated but never match a toggle and are left out of the statistics.
    pub unrecognized_designation: Option<String>,
    pub line: Option<u32>,
    pub note: Option<String>,
    pub subitems: Vec<Item>,
}

#[derive(Serialize, Deserialize)]
struct RawItem {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    number: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::label"
    )]
    letter: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::label"
    )]
    roman: Option<String>,
    title: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::label"
    )]
    designation: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    line: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::label"
    )]
    note: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::vec"
    )]
    subitems: Vec<Item>,
}

impl From<RawItem> for Item {
    fn from(raw: RawItem) -> Self {
        let (designation, unrecognized_designation) = match raw.designation {
            Some(code) => match Designation::from_code(code.trim()) {
                Some(designation) => (Some(designation), None),
                None => (None, Some(code)),
            },
            None => (None, None),
        };
        Item {
            number: raw.number,
            letter: raw.letter,
            roman: raw.roman,
            title: raw.title,
            designation,
            unrecognized_designation,
            line: raw.line,
            note: raw.note,
            subitems: raw.subitems,
        }
    }
}

impl From<Item> for RawItem {
    fn from(item: Item) -> Self {
        RawItem {
            number: item.number,
            letter: item.letter,
            roman: item.roman,
            title: item.title,
            designation: item
                .designation
                .map(|designation| designation.code().to_string())
                .or(item.unrecognized_designation),
            line: item.line,
            note: item.note,
            subitems: item.subitems,
        }
    }
}

impl Item {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            number: None,
            letter: None,
            roman: None,
            title: title.into(),
            designation: None,
            unrecognized_designation: None,
            line: None,
            note: None,
            subitems: Vec::new(),
        }
    }

    pub fn designated(title: impl Into<String>, designation: Designation) -> Self {
        let mut item = Self::new(title);
        item.designation = Some(designation);
        item
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_subitems(mut self, subitems: Vec<Item>) -> Self {
        self.subitems = subitems;
        self
    }

    /// True for any designation text, recognized or not; false only for organizational entries.
    pub fn is_designated(&self) -> bool {
        self.designation.is_some() || self.unrecognized_designation.is_some()
    }

    /// Number, letter and roman labels joined as `1. a. ii. `, empty when unlabeled.
    pub fn label_prefix(&self) -> String {
        let mut prefix = String::new();
        if let Some(number) = self.number {
            prefix.push_str(&format!("{number}. "));
        }
        if let Some(letter) = &self.letter {
            prefix.push_str(&format!("{letter}. "));
        }
        if let Some(roman) = &self.roman {
            prefix.push_str(&format!("{roman}. "));
        }
        prefix
    }

    pub fn display_text(&self) -> String {
        let mut text = self.label_prefix();
        text.push_str(&self.title);
        if let Some(code) = self.designation_code() {
            text.push_str(&format!(" [{code}]"));
        }
        text
    }

    /// The designation as written in the document, recognized or not.
    pub fn designation_code(&self) -> Option<&str> {
        self.designation
            .map(|designation| designation.code())
            .or(self.unrecognized_designation.as_deref())
    }

    pub(crate) fn with_filtered_subitems(&self, subitems: Vec<Item>) -> Item {
        Item {
            number: self.number,
            letter: self.letter.clone(),
            roman: self.roman.clone(),
            title: self.title.clone(),
            designation: self.designation,
            unrecognized_designation: self.unrecognized_designation.clone(),
            line: self.line,
            note: self.note.clone(),
            subitems,
        }
    }

    pub fn descendant_count(&self) -> usize {
        self.subitems
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }
}

/// Third hierarchy level under a subsection: a titled list of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedSection {
    pub title: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    pub line: Option<u32>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsection {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    pub number: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::label"
    )]
    pub letter: Option<String>,
    pub title: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    pub line: Option<u32>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub items: Vec<Item>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::vec"
    )]
    pub sections: Vec<NestedSection>,
}

impl Subsection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            number: None,
            letter: None,
            title: title.into(),
            line: None,
            items: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn label(&self) -> Option<String> {
        self.letter
            .clone()
            .or_else(|| self.number.map(|number| number.to_string()))
    }

    pub fn heading(&self) -> String {
        match self.label() {
            Some(label) => format!("{label}. {}", self.title),
            None => self.title.clone(),
        }
    }

    pub fn all_item_lists(&self) -> impl Iterator<Item = &[Item]> {
        std::iter::once(self.items.as_slice())
            .chain(self.sections.iter().map(|nested| nested.items.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "section")]
    pub number: u32,
    pub title: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::section_type")]
    pub kind: SectionType,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::label"
    )]
    pub note: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    pub line: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::vec"
    )]
    pub items: Vec<Item>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::vec"
    )]
    pub subsections: Vec<Subsection>,
}

impl Section {
    pub fn new(kind: SectionType, number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            kind,
            note: None,
            line: None,
            items: Vec::new(),
            subsections: Vec::new(),
        }
    }

    pub fn key(&self) -> SectionKey {
        SectionKey::new(self.kind, self.number)
    }

    pub fn heading(&self) -> String {
        format!(
            "{} {}: {}",
            self.kind.abbreviation(),
            self.number,
            self.title
        )
    }

    /// Title without the "Topics for Anatomic Pathology Residents:" and leading "The " prefixes.
    pub fn clean_title(&self) -> String {
        let stripped = RESIDENT_TOPICS_PREFIX.replace(&self.title, "");
        LEADING_ARTICLE.replace(&stripped, "").into_owned()
    }

    pub fn clean_heading(&self) -> String {
        format!(
            "{} {}: {}",
            self.kind.abbreviation(),
            self.number,
            self.clean_title()
        )
    }

    /// Every item list owned by the section: its own, each subsection's, each nested section's.
    pub fn all_item_lists(&self) -> impl Iterator<Item = &[Item]> {
        std::iter::once(self.items.as_slice())
            .chain(self.subsections.iter().flat_map(|sub| sub.all_item_lists()))
    }

    /// Direct entries across all item lists, without descending into subitems.
    pub fn direct_item_count(&self) -> usize {
        self.all_item_lists().map(|items| items.len()).sum()
    }

    fn sort_key(&self) -> (SectionType, u32) {
        (self.kind, self.number)
    }
}

/// Read-only content specification, sections kept in type-then-number order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentTree {
    sections: Vec<Section>,
}

impl ContentTree {
    pub fn new(mut sections: Vec<Section>) -> Self {
        sections.sort_by_key(Section::sort_key);
        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn sections_of(&self, kind: SectionType) -> impl Iterator<Item = &Section> {
        self.sections
            .iter()
            .filter(move |section| section.kind == kind)
    }

    /// Total number of item nodes at any depth.
    pub fn node_count(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|section| section.all_item_lists())
            .flat_map(|items| items.iter())
            .map(|item| 1 + item.descendant_count())
            .sum()
    }

    pub fn section_options(&self) -> Vec<SectionOption> {
        self.sections
            .iter()
            .map(|section| {
                let item_count = section.direct_item_count();
                SectionOption {
                    key: section.key(),
                    kind: section.kind,
                    number: section.number,
                    label: format!("{} ({item_count} items)", section.heading()),
                    item_count,
                }
            })
            .collect()
    }

    /// Indented plain-text rendering, one node per line.
    pub fn outline(&self) -> String {
        let mut lines = Vec::new();
        for section in &self.sections {
            lines.push(section.heading());
            push_item_lines(&mut lines, &section.items, 1);
            for subsection in &section.subsections {
                lines.push(format!("  {}", subsection.heading()));
                push_item_lines(&mut lines, &subsection.items, 2);
                for nested in &subsection.sections {
                    lines.push(format!("    {}", nested.title));
                    push_item_lines(&mut lines, &nested.items, 3);
                }
            }
        }
        lines.join("\n")
    }
}

fn push_item_lines(lines: &mut Vec<String>, items: &[Item], depth: usize) {
    for item in items {
        lines.push(format!("{}{}", "  ".repeat(depth), item.display_text()));
        push_item_lines(lines, &item.subitems, depth + 1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionOption {
    pub key: SectionKey,
    pub kind: SectionType,
    pub number: u32,
    pub label: String,
    pub item_count: usize,
}

pub(crate) mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::SectionType;

    /// Non-array values become an empty list and unreadable elements are dropped.
    pub fn vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(elements(value))
    }

    pub fn elements<T: DeserializeOwned>(value: Value) -> Vec<T> {
        match value {
            Value::Array(entries) => entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn section_type<'de, D>(deserializer: D) -> Result<SectionType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => s.parse().unwrap_or_default(),
            _ => SectionType::default(),
        })
    }
}
