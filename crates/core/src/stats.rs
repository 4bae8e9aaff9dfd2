use std::iter::Sum;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::model::{ContentTree, Designation, Item, Section, SectionType, Subsection};

/// Counts of designated items; undesignated items never contribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignationCounts {
    pub total: usize,
    pub core: usize,
    pub advanced_resident: usize,
    pub fellow: usize,
}

impl DesignationCounts {
    pub fn of_items(items: &[Item]) -> Self {
        let mut counts = Self::default();
        counts.add_items(items);
        counts
    }

    pub fn of_subsection(subsection: &Subsection) -> Self {
        subsection.all_item_lists().map(Self::of_items).sum()
    }

    pub fn of_section(section: &Section) -> Self {
        section.all_item_lists().map(Self::of_items).sum()
    }

    pub fn of_sections(sections: &[Section]) -> Self {
        sections.iter().map(Self::of_section).sum()
    }

    pub fn get(&self, designation: Designation) -> usize {
        match designation {
            Designation::Core => self.core,
            Designation::AdvancedResident => self.advanced_resident,
            Designation::Fellow => self.fellow,
        }
    }

    fn record(&mut self, designation: Designation) {
        self.total += 1;
        match designation {
            Designation::Core => self.core += 1,
            Designation::AdvancedResident => self.advanced_resident += 1,
            Designation::Fellow => self.fellow += 1,
        }
    }

    fn add_items(&mut self, items: &[Item]) {
        for item in items {
            if let Some(designation) = item.designation {
                self.record(designation);
            }
            self.add_items(&item.subitems);
        }
    }
}

impl AddAssign for DesignationCounts {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.core += other.core;
        self.advanced_resident += other.advanced_resident;
        self.fellow += other.fellow;
    }
}

impl Sum for DesignationCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, counts| {
            acc += counts;
            acc
        })
    }
}

pub fn aggregate(tree: &ContentTree) -> DesignationCounts {
    DesignationCounts::of_sections(tree.sections())
}

/// `100 * part / whole`, or zero when there is nothing to divide by.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

pub fn format_percentage(value: f64) -> String {
    format!("{value:.1}%")
}

/// Visible counts measured against the designated total of the unfiltered tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_visible: usize,
    pub total_all: usize,
    pub core: usize,
    pub advanced_resident: usize,
    pub fellow: usize,
    pub total_percentage: f64,
    pub core_percentage: f64,
    pub advanced_resident_percentage: f64,
    pub fellow_percentage: f64,
}

impl StatsSummary {
    pub fn compute(full: &ContentTree, visible: &ContentTree) -> Self {
        Self::from_counts(aggregate(visible), aggregate(full).total)
    }

    pub fn from_counts(visible: DesignationCounts, baseline_total: usize) -> Self {
        Self {
            total_visible: visible.total,
            total_all: baseline_total,
            core: visible.core,
            advanced_resident: visible.advanced_resident,
            fellow: visible.fellow,
            total_percentage: percentage(visible.total, baseline_total),
            core_percentage: percentage(visible.core, visible.total),
            advanced_resident_percentage: percentage(visible.advanced_resident, visible.total),
            fellow_percentage: percentage(visible.fellow, visible.total),
        }
    }

    pub fn visible_counts(&self) -> DesignationCounts {
        DesignationCounts {
            total: self.total_visible,
            core: self.core,
            advanced_resident: self.advanced_resident,
            fellow: self.fellow,
        }
    }

    pub fn count(&self, designation: Designation) -> usize {
        self.visible_counts().get(designation)
    }

    pub fn percentage_of_visible(&self, designation: Designation) -> f64 {
        match designation {
            Designation::Core => self.core_percentage,
            Designation::AdvancedResident => self.advanced_resident_percentage,
            Designation::Fellow => self.fellow_percentage,
        }
    }

    pub fn percentage_of_all(&self, designation: Designation) -> f64 {
        percentage(self.count(designation), self.total_all)
    }
}

/// One row of the section breakdown: a section (depth 0) or one of its subsections (depth 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStats {
    pub key: String,
    pub title: String,
    pub kind: SectionType,
    pub depth: u8,
    pub counts: DesignationCounts,
    pub percentage_of_total: f64,
    pub percentage_of_selected: f64,
}

/// Per-section rows followed by their non-empty subsection rows.
///
/// `% of total` divides by `baseline_total`, the designated count of the unfiltered tree;
/// `% of selected` divides by the designated count of `sections` themselves.
pub fn section_stats(sections: &[Section], baseline_total: usize) -> Vec<SectionStats> {
    let visible_total = DesignationCounts::of_sections(sections).total;
    let row = |key: String, title: String, kind, depth, counts: DesignationCounts| SectionStats {
        key,
        title,
        kind,
        depth,
        counts,
        percentage_of_total: percentage(counts.total, baseline_total),
        percentage_of_selected: percentage(counts.total, visible_total),
    };
    let mut rows = Vec::new();
    for section in sections {
        rows.push(row(
            section.key().to_string(),
            section.heading(),
            section.kind,
            0,
            DesignationCounts::of_section(section),
        ));
        for (idx, subsection) in section.subsections.iter().enumerate() {
            let counts = DesignationCounts::of_subsection(subsection);
            if counts.total == 0 {
                continue;
            }
            let label = subsection
                .label()
                .unwrap_or_else(|| (idx + 1).to_string());
            rows.push(row(
                format!("{}-{label}", section.key()),
                subsection.heading(),
                section.kind,
                1,
                counts,
            ));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{filter, DesignationSet, FilterOptions};

    fn foo_bar_tree() -> ContentTree {
        let mut section = Section::new(SectionType::Ap, 1, "General");
        section.items = vec![
            Item::designated("Foo", Designation::Core),
            Item::designated("Bar", Designation::AdvancedResident),
        ];
        ContentTree::new(vec![section])
    }

    #[test]
    fn aggregate_counts_designated_items() {
        let counts = aggregate(&foo_bar_tree());
        assert_eq!(
            counts,
            DesignationCounts {
                total: 2,
                core: 1,
                advanced_resident: 1,
                fellow: 0
            }
        );
    }

    #[test]
    fn headers_do_not_count_but_their_children_do() {
        let items = vec![Item::new("Header").with_subitems(vec![
            Item::designated("A", Designation::Fellow),
            Item::new("Inner").with_subitems(vec![Item::designated("B", Designation::Core)]),
        ])];
        let counts = DesignationCounts::of_items(&items);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.fellow, 1);
        assert_eq!(counts.core, 1);
    }

    #[test]
    fn percentage_of_all_uses_unfiltered_baseline() {
        let full = foo_bar_tree();
        let options = FilterOptions {
            designations: DesignationSet::only(&[Designation::Core]),
            ..Default::default()
        };
        let visible = filter(&full, &options);
        let summary = StatsSummary::compute(&full, &visible);
        assert_eq!(summary.total_visible, 1);
        assert_eq!(summary.total_all, 2);
        assert_eq!(summary.core, 1);
        assert_eq!(summary.advanced_resident, 0);
        assert_eq!(summary.percentage_of_all(Designation::Core), 50.0);
        assert_eq!(summary.total_percentage, 50.0);
        assert_eq!(summary.core_percentage, 100.0);
    }

    #[test]
    fn zero_baselines_yield_zero_percent() {
        assert_eq!(percentage(3, 0), 0.0);
        let summary = StatsSummary::from_counts(DesignationCounts::default(), 0);
        assert_eq!(summary.total_percentage, 0.0);
        assert_eq!(summary.fellow_percentage, 0.0);
        assert!(!summary.core_percentage.is_nan());
    }

    #[test]
    fn percentages_format_with_one_decimal() {
        assert_eq!(format_percentage(percentage(1, 3)), "33.3%");
        assert_eq!(format_percentage(percentage(2, 3)), "66.7%");
        assert_eq!(format_percentage(0.0), "0.0%");
    }

    #[test]
    fn empty_subsections_are_omitted_from_breakdown() {
        let mut section = Section::new(SectionType::Cp, 3, "Transfusion");
        section.items = vec![Item::designated("ABO typing", Designation::Core)];
        let mut headers_only = Subsection::new("Overview");
        headers_only.letter = Some("A".to_string());
        headers_only.items = vec![Item::new("Organizational header")];
        let mut reactions = Subsection::new("Reactions");
        reactions.letter = Some("B".to_string());
        reactions.items = vec![
            Item::designated("TRALI", Designation::AdvancedResident),
            Item::designated("TACO", Designation::Fellow),
        ];
        section.subsections = vec![headers_only, reactions];

        let rows = section_stats(std::slice::from_ref(&section), 6);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "cp-3");
        assert_eq!(rows[0].counts.total, 3);
        assert_eq!(rows[0].percentage_of_total, 50.0);
        assert_eq!(rows[0].percentage_of_selected, 100.0);
        assert_eq!(rows[1].key, "cp-3-B");
        assert_eq!(rows[1].title, "B. Reactions");
        assert_eq!(rows[1].depth, 1);
        assert_eq!(rows[1].counts.total, 2);
        assert_eq!(format_percentage(rows[1].percentage_of_selected), "66.7%");
    }
}
