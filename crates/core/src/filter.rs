use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AbpathError, Result};
use crate::model::{
    ContentTree, Designation, Item, NestedSection, Section, SectionKey, SectionType, Subsection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignationSet {
    pub core: bool,
    pub advanced_resident: bool,
    pub fellow: bool,
}

impl DesignationSet {
    pub fn all() -> Self {
        Self {
            core: true,
            advanced_resident: true,
            fellow: true,
        }
    }

    pub fn none() -> Self {
        Self {
            core: false,
            advanced_resident: false,
            fellow: false,
        }
    }

    pub fn only(designations: &[Designation]) -> Self {
        let mut set = Self::none();
        for designation in designations {
            set.insert(*designation);
        }
        set
    }

    pub fn insert(&mut self, designation: Designation) {
        match designation {
            Designation::Core => self.core = true,
            Designation::AdvancedResident => self.advanced_resident = true,
            Designation::Fellow => self.fellow = true,
        }
    }

    pub fn contains(&self, designation: Designation) -> bool {
        match designation {
            Designation::Core => self.core,
            Designation::AdvancedResident => self.advanced_resident,
            Designation::Fellow => self.fellow,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.core || self.advanced_resident || self.fellow)
    }

    pub fn is_all(&self) -> bool {
        self.core && self.advanced_resident && self.fellow
    }

    pub fn iter(&self) -> impl Iterator<Item = Designation> + '_ {
        Designation::ALL
            .into_iter()
            .filter(move |designation| self.contains(*designation))
    }
}

impl Default for DesignationSet {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for DesignationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.iter().map(|d| d.code()).join(","))
    }
}

impl FromStr for DesignationSet {
    type Err = AbpathError;

    /// Comma separated codes such as `C,AR`; `none` or an empty string disables all.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::none());
        }
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let mut set = Self::none();
        for code in trimmed.split(',').filter(|c| !c.trim().is_empty()) {
            set.insert(code.parse()?);
        }
        Ok(set)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTypeSet {
    pub ap: bool,
    pub cp: bool,
}

impl SectionTypeSet {
    pub fn all() -> Self {
        Self { ap: true, cp: true }
    }

    pub fn none() -> Self {
        Self {
            ap: false,
            cp: false,
        }
    }

    pub fn contains(&self, kind: SectionType) -> bool {
        match kind {
            SectionType::Ap => self.ap,
            SectionType::Cp => self.cp,
        }
    }

    pub fn is_all(&self) -> bool {
        self.ap && self.cp
    }

    pub fn is_empty(&self) -> bool {
        !(self.ap || self.cp)
    }

    pub fn iter(&self) -> impl Iterator<Item = SectionType> + '_ {
        SectionType::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl Default for SectionTypeSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for SectionTypeSet {
    type Err = AbpathError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::none());
        }
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let mut set = Self::none();
        for kind in trimmed.split(',').filter(|k| !k.trim().is_empty()) {
            match kind.parse::<SectionType>()? {
                SectionType::Ap => set.ap = true,
                SectionType::Cp => set.cp = true,
            }
        }
        Ok(set)
    }
}

/// Composite predicate applied by [`filter`]. The default shows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub designations: DesignationSet,
    #[serde(default)]
    pub section_types: SectionTypeSet,
    #[serde(default)]
    pub sections: Vec<SectionKey>,
}

impl FilterOptions {
    pub fn is_unrestricted(&self) -> bool {
        self.search.trim().is_empty()
            && self.designations.is_all()
            && self.section_types.is_all()
            && self.sections.is_empty()
    }

    fn needle(&self) -> Option<String> {
        let trimmed = self.search.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }

    /// Human-readable lines describing the active filters, as printed on the export summary.
    pub fn describe(&self) -> Vec<String> {
        let types: Vec<&str> = self.section_types.iter().map(|k| k.abbreviation()).collect();
        let designations: Vec<String> = self.designations.iter().map(|d| d.label()).collect();
        let mut lines = vec![
            format!("Content Types: {}", join_or_none(&types)),
            format!("Designations: {}", join_or_none(&designations)),
        ];
        let search = self.search.trim();
        if !search.is_empty() {
            lines.push(format!("Search Term: \"{search}\""));
        }
        if !self.sections.is_empty() {
            lines.push(format!(
                "Selected Sections: {} section(s)",
                self.sections.len()
            ));
        }
        lines
    }
}

fn join_or_none<S: AsRef<str>>(parts: &[S]) -> String {
    if parts.is_empty() {
        "None".to_string()
    } else {
        parts.iter().map(|p| p.as_ref()).join(", ")
    }
}

/// Returns a pruned copy of `tree` that keeps only branches matching `options`.
pub fn filter(tree: &ContentTree, options: &FilterOptions) -> ContentTree {
    if options.is_unrestricted() {
        return tree.clone();
    }
    let matcher = ItemMatcher::new(options);
    let sections: Vec<Section> = tree
        .sections()
        .iter()
        .filter(|section| options.section_types.contains(section.kind))
        .filter(|section| options.sections.is_empty() || options.sections.contains(&section.key()))
        .filter_map(|section| matcher.filter_section(section))
        .collect();
    debug!(
        before = tree.len(),
        after = sections.len(),
        "filtered content sections"
    );
    ContentTree::new(sections)
}

struct ItemMatcher {
    needle: Option<String>,
    designations: DesignationSet,
}

impl ItemMatcher {
    fn new(options: &FilterOptions) -> Self {
        Self {
            needle: options.needle(),
            designations: options.designations,
        }
    }

    fn matches_text(&self, item: &Item) -> bool {
        let Some(needle) = self.needle.as_deref() else {
            return true;
        };
        item.title.to_lowercase().contains(needle)
            || item
                .note
                .as_deref()
                .map(|note| note.to_lowercase().contains(needle))
                .unwrap_or(false)
    }

    fn filter_items(&self, items: &[Item]) -> Vec<Item> {
        items
            .iter()
            .filter_map(|item| self.filter_item(item))
            .collect()
    }

    fn filter_item(&self, item: &Item) -> Option<Item> {
        let subitems = self.filter_items(&item.subitems);
        let text_match = self.matches_text(item);
        let keep = if self.designations.is_empty() {
            // every designation toggled off: only organizational items remain
            !item.is_designated() && text_match
        } else {
            let designation_match = item
                .designation
                .map(|d| self.designations.contains(d))
                .unwrap_or(false);
            (designation_match && text_match)
                || !subitems.is_empty()
                || (!item.is_designated() && text_match)
        };
        keep.then(|| item.with_filtered_subitems(subitems))
    }

    fn filter_nested(&self, nested: &NestedSection) -> Option<NestedSection> {
        let items = self.filter_items(&nested.items);
        (!items.is_empty()).then(|| NestedSection {
            title: nested.title.clone(),
            line: nested.line,
            items,
        })
    }

    fn filter_subsection(&self, subsection: &Subsection) -> Option<Subsection> {
        let items = self.filter_items(&subsection.items);
        let sections: Vec<NestedSection> = subsection
            .sections
            .iter()
            .filter_map(|nested| self.filter_nested(nested))
            .collect();
        if items.is_empty() && sections.is_empty() {
            return None;
        }
        Some(Subsection {
            number: subsection.number,
            letter: subsection.letter.clone(),
            title: subsection.title.clone(),
            line: subsection.line,
            items,
            sections,
        })
    }

    fn filter_section(&self, section: &Section) -> Option<Section> {
        let items = self.filter_items(&section.items);
        let subsections: Vec<Subsection> = section
            .subsections
            .iter()
            .filter_map(|subsection| self.filter_subsection(subsection))
            .collect();
        if items.is_empty() && subsections.is_empty() {
            return None;
        }
        Some(Section {
            number: section.number,
            title: section.title.clone(),
            kind: section.kind,
            note: section.note.clone(),
            line: section.line,
            items,
            subsections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo_bar_tree() -> ContentTree {
        let mut section = Section::new(SectionType::Ap, 1, "General");
        section.items = vec![
            Item::designated("Foo", Designation::Core),
            Item::designated("Bar", Designation::AdvancedResident),
        ];
        ContentTree::new(vec![section])
    }

    fn layered_tree() -> ContentTree {
        let mut breast = Section::new(SectionType::Ap, 2, "Breast");
        breast.items = vec![Item::new("Benign lesions").with_subitems(vec![
            Item::designated("Fibroadenoma", Designation::Core),
            Item::designated("Phyllodes tumor", Designation::Fellow)
                .with_note("borderline variants"),
        ])];
        let mut chem = Section::new(SectionType::Cp, 1, "Chemistry");
        let mut lipids = Subsection::new("Lipids");
        lipids.letter = Some("A".to_string());
        lipids.items = vec![Item::designated("Cholesterol", Designation::AdvancedResident)];
        lipids.sections = vec![NestedSection {
            title: "Lipoproteins".to_string(),
            line: None,
            items: vec![Item::designated("LDL", Designation::Core)],
        }];
        chem.subsections.push(lipids);
        ContentTree::new(vec![chem, breast])
    }

    #[test]
    fn designation_filter_keeps_matching_items() {
        let options = FilterOptions {
            designations: DesignationSet::only(&[Designation::Core]),
            ..Default::default()
        };
        let filtered = filter(&foo_bar_tree(), &options);
        assert_eq!(filtered.len(), 1);
        let titles: Vec<&str> = filtered.sections()[0]
            .items
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Foo"]);
    }

    #[test]
    fn all_designations_off_keeps_only_organizational_items() {
        let options = FilterOptions {
            designations: DesignationSet::none(),
            ..Default::default()
        };
        assert!(filter(&foo_bar_tree(), &options).is_empty());

        let filtered = filter(&layered_tree(), &options);
        assert_eq!(filtered.len(), 1);
        let header = &filtered.sections()[0].items[0];
        assert_eq!(header.title, "Benign lesions");
        assert!(header.subitems.is_empty());
    }

    #[test]
    fn unrecognized_designation_never_matches_a_toggle() {
        let mut section = Section::new(SectionType::Ap, 1, "General Topics");
        let mut odd = Item::new("Legacy entry");
        odd.unrecognized_designation = Some("Z".to_string());
        section.items = vec![odd, Item::new("Overview")];
        let tree = ContentTree::new(vec![section]);

        for designations in [DesignationSet::all(), DesignationSet::none()] {
            let options = FilterOptions {
                designations,
                search: "e".to_string(),
                ..Default::default()
            };
            let filtered = filter(&tree, &options);
            let titles: Vec<&str> = filtered.sections()[0]
                .items
                .iter()
                .map(|i| i.title.as_str())
                .collect();
            assert_eq!(titles, vec!["Overview"]);
        }
    }

    #[test]
    fn header_survives_through_matching_descendant() {
        let options = FilterOptions {
            search: "PHYLLODES".to_string(),
            ..Default::default()
        };
        let filtered = filter(&layered_tree(), &options);
        assert_eq!(filtered.len(), 1);
        let header = &filtered.sections()[0].items[0];
        assert_eq!(header.title, "Benign lesions");
        assert_eq!(header.subitems.len(), 1);
        assert_eq!(header.subitems[0].title, "Phyllodes tumor");
    }

    #[test]
    fn search_matches_notes() {
        let options = FilterOptions {
            search: "borderline".to_string(),
            ..Default::default()
        };
        let filtered = filter(&layered_tree(), &options);
        assert_eq!(filtered.sections()[0].items[0].subitems[0].title, "Phyllodes tumor");
    }

    #[test]
    fn nested_sections_survive_on_their_own() {
        let options = FilterOptions {
            search: "ldl".to_string(),
            ..Default::default()
        };
        let filtered = filter(&layered_tree(), &options);
        assert_eq!(filtered.len(), 1);
        let lipids = &filtered.sections()[0].subsections[0];
        assert!(lipids.items.is_empty());
        assert_eq!(lipids.sections.len(), 1);
        assert_eq!(lipids.sections[0].items[0].title, "LDL");
    }

    #[test]
    fn section_type_and_selection_restrict_sections() {
        let cp_only = FilterOptions {
            section_types: SectionTypeSet { ap: false, cp: true },
            ..Default::default()
        };
        let filtered = filter(&layered_tree(), &cp_only);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.sections()[0].kind, SectionType::Cp);

        let selected = FilterOptions {
            sections: vec!["ap-2".parse().unwrap()],
            ..Default::default()
        };
        let filtered = filter(&layered_tree(), &selected);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.sections()[0].title, "Breast");

        let nothing = FilterOptions {
            section_types: SectionTypeSet::none(),
            ..Default::default()
        };
        assert!(filter(&layered_tree(), &nothing).is_empty());
    }

    #[test]
    fn unmatched_search_yields_empty_tree() {
        let options = FilterOptions {
            search: "zebra".to_string(),
            ..Default::default()
        };
        assert!(filter(&layered_tree(), &options).is_empty());
    }

    #[test]
    fn unrestricted_filter_keeps_childless_sections() {
        let tree = ContentTree::new(vec![Section::new(SectionType::Cp, 4, "Empty")]);
        assert_eq!(filter(&tree, &FilterOptions::default()), tree);
    }

    #[test]
    fn output_sorted_by_type_then_number() {
        let options = FilterOptions {
            search: "o".to_string(),
            ..Default::default()
        };
        let filtered = filter(&layered_tree(), &options);
        let keys: Vec<String> = filtered
            .sections()
            .iter()
            .map(|s| s.key().to_string())
            .collect();
        assert_eq!(keys, vec!["ap-2", "cp-1"]);
    }

    #[test]
    fn parses_toggle_sets() {
        let set: DesignationSet = "c, ar".parse().unwrap();
        assert!(set.core && set.advanced_resident && !set.fellow);
        assert_eq!(set.to_string(), "C,AR");
        assert!("none".parse::<DesignationSet>().unwrap().is_empty());
        assert!("X".parse::<DesignationSet>().is_err());
        let types: SectionTypeSet = "cp".parse().unwrap();
        assert!(!types.ap && types.cp);
    }

    #[test]
    fn describe_lists_active_filters() {
        let options = FilterOptions {
            search: " melanoma ".to_string(),
            designations: DesignationSet::only(&[Designation::Core, Designation::Fellow]),
            section_types: SectionTypeSet { ap: true, cp: false },
            sections: vec!["ap-1".parse().unwrap(), "ap-2".parse().unwrap()],
        };
        assert_eq!(
            options.describe(),
            vec![
                "Content Types: AP".to_string(),
                "Designations: Core (C), Fellow (F)".to_string(),
                "Search Term: \"melanoma\"".to_string(),
                "Selected Sections: 2 section(s)".to_string(),
            ]
        );
        let none = FilterOptions {
            designations: DesignationSet::none(),
            section_types: SectionTypeSet::none(),
            ..Default::default()
        };
        assert_eq!(none.describe()[0], "Content Types: None");
        assert_eq!(none.describe()[1], "Designations: None");
    }
}
