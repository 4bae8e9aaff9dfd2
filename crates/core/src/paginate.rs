use serde::{Deserialize, Serialize};

use crate::model::{ContentTree, Item, Section, SectionKey, SectionType};

pub const DEFAULT_SECTIONS_PER_PAGE: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub current_page: usize,
    pub total_pages: usize,
    pub sections_per_page: usize,
    pub total_sections: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionPage<'a> {
    pub sections: &'a [Section],
    pub pagination: PaginationInfo,
}

/// Slices `sections` into 1-based pages. Out-of-range pages are empty.
pub fn paginate(sections: &[Section], page: usize, per_page: usize) -> SectionPage<'_> {
    let per_page = if per_page == 0 {
        DEFAULT_SECTIONS_PER_PAGE
    } else {
        per_page
    };
    let page = page.max(1);
    let total_sections = sections.len();
    let total_pages = total_sections.div_ceil(per_page);
    let start = (page - 1).saturating_mul(per_page).min(total_sections);
    let end = start.saturating_add(per_page).min(total_sections);
    SectionPage {
        sections: &sections[start..end],
        pagination: PaginationInfo {
            current_page: page,
            total_pages,
            sections_per_page: per_page,
            total_sections,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        },
    }
}

/// Whole-section selection used by the paginated listing; sections are kept or dropped
/// intact, never pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionQuery {
    pub kind: Option<SectionType>,
    pub category: Option<SectionKey>,
    pub search: Option<String>,
}

impl SectionQuery {
    pub fn select(&self, tree: &ContentTree) -> Vec<Section> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        tree.sections()
            .iter()
            .filter(|section| self.kind.map_or(true, |kind| section.kind == kind))
            .filter(|section| self.category.map_or(true, |key| section.key() == key))
            .filter(|section| {
                needle
                    .as_deref()
                    .map_or(true, |needle| section_mentions(section, needle))
            })
            .cloned()
            .collect()
    }
}

fn contains(text: &str, needle: &str) -> bool {
    text.to_lowercase().contains(needle)
}

fn item_mentions(item: &Item, needle: &str) -> bool {
    contains(&item.title, needle)
        || item.note.as_deref().is_some_and(|note| contains(note, needle))
        || item.subitems.iter().any(|child| item_mentions(child, needle))
}

fn section_mentions(section: &Section, needle: &str) -> bool {
    contains(&section.title, needle)
        || section.note.as_deref().is_some_and(|note| contains(note, needle))
        || section
            .subsections
            .iter()
            .any(|subsection| contains(&subsection.title, needle))
        || section
            .subsections
            .iter()
            .flat_map(|subsection| &subsection.sections)
            .any(|nested| contains(&nested.title, needle))
        || section
            .all_item_lists()
            .flatten()
            .any(|item| item_mentions(item, needle))
}

/// Listed entries plus their immediate subitems, as shown by the section browser.
pub fn listed_item_count(sections: &[Section]) -> usize {
    sections
        .iter()
        .flat_map(|section| section.all_item_lists())
        .flatten()
        .map(|item| 1 + item.subitems.len())
        .sum()
}
