use chrono::NaiveDateTime;
use tracing::debug;

use crate::layout::{ColumnMode, PageGeometry, PageLayout, PT_TO_MM};
use crate::logo::Logo;
use crate::model::{ContentTree, Designation, Item, Section};
use crate::stats::{format_percentage, percentage, SectionStats, StatsSummary};

pub const BRAND: &str = "Pathology Bites";
pub const SUBTITLE: &str = "ABPath Content Specifications";
pub const REPORT_TITLE: &str = "ABPath Content Specifications - Export Summary";
pub const NO_SECTIONS: &str = "No sections match the current filters.";
pub const NO_CONTENT: &str = "No content matches the current filters.";

const HEADER_ROW_HEIGHT: f32 = 6.0;
const ROW_HEIGHT: f32 = 5.0;
const ITEM_INDENT: f32 = 4.0;
const MIN_TEXT_WIDTH: f32 = 20.0;
const LOGO_SIZE: f32 = 10.0;
const REGULAR_GLYPH_EM: f32 = 0.5;
const BOLD_GLYPH_EM: f32 = 0.55;

const OVERALL_WIDTHS: [f32; 4] = [70.0, 30.0, 35.0, 35.0];
const BREAKDOWN_WIDTHS: [f32; 7] = [75.0, 16.0, 11.0, 11.0, 11.0, 18.0, 18.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const TEAL: Rgb = Rgb(20, 184, 166);
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const LIGHT_GRAY: Rgb = Rgb(245, 245, 245);

    pub fn unit(&self) -> [f32; 3] {
        [
            self.0 as f32 / 255.0,
            self.1 as f32 / 255.0,
            self.2 as f32 / 255.0,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
}

impl FontStyle {
    fn glyph_em(&self) -> f32 {
        match self {
            FontStyle::Regular => REGULAR_GLYPH_EM,
            FontStyle::Bold => BOLD_GLYPH_EM,
        }
    }
}

/// A positioned drawing primitive. Coordinates are millimetres from the top-left corner;
/// text `y` is the baseline, rectangle and image `y` is the top edge.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        size: f32,
        style: FontStyle,
        color: Rgb,
        text: String,
    },
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
        color: Rgb,
    },
    Image {
        x: f32,
        y: f32,
        size: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

impl Page {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub geometry: PageGeometry,
    pub pages: Vec<Page>,
    pub logo: Option<Logo>,
}

impl Report {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for (idx, page) in self.pages.iter().enumerate() {
            out.push_str(&format!("--- page {} ---\n", idx + 1));
            for line in page.texts() {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    pub columns: ColumnMode,
    pub geometry: PageGeometry,
}

/// Everything the exporter renders: the filtered tree, its statistics and the filter summary.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub visible: &'a ContentTree,
    pub summary: &'a StatsSummary,
    pub section_stats: &'a [SectionStats],
    pub filter_lines: &'a [String],
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    config: ReportConfig,
    logo: Option<Logo>,
}

impl ReportBuilder {
    pub fn new(config: ReportConfig) -> Self {
        Self { config, logo: None }
    }

    pub fn with_logo(mut self, logo: Option<Logo>) -> Self {
        self.logo = logo;
        self
    }

    pub fn build(&self, input: &ReportInput<'_>) -> Report {
        let mut writer = ReportWriter::new(
            self.config.geometry,
            input.generated_at.format("%Y-%m-%d").to_string(),
            self.logo.is_some(),
        );
        writer.summary(input);
        writer.content_details(input.visible, self.config.columns);
        let pages = writer.finish();
        debug!(
            pages = pages.len(),
            sections = input.visible.len(),
            "built content report"
        );
        Report {
            geometry: self.config.geometry,
            pages,
            logo: self.logo.clone(),
        }
    }
}

struct ReportWriter {
    layout: PageLayout,
    pages: Vec<Page>,
    date_label: String,
    has_logo: bool,
}

impl ReportWriter {
    fn new(geometry: PageGeometry, date_label: String, has_logo: bool) -> Self {
        let mut writer = Self {
            layout: PageLayout::new(geometry, ColumnMode::Single),
            pages: Vec::new(),
            date_label,
            has_logo,
        };
        writer.page_mut(0);
        writer
    }

    fn geometry(&self) -> PageGeometry {
        *self.layout.geometry()
    }

    fn header_ops(&self) -> Vec<DrawOp> {
        let geometry = self.geometry();
        let mut ops = Vec::with_capacity(5);
        let mut text_x = geometry.margin;
        if self.has_logo {
            ops.push(DrawOp::Image {
                x: geometry.margin,
                y: 5.0,
                size: LOGO_SIZE,
            });
            text_x += LOGO_SIZE + 3.0;
        }
        ops.push(DrawOp::Text {
            x: text_x,
            y: 11.0,
            size: 11.0,
            style: FontStyle::Bold,
            color: Rgb::BLACK,
            text: BRAND.to_string(),
        });
        ops.push(DrawOp::Text {
            x: text_x,
            y: 15.0,
            size: 8.0,
            style: FontStyle::Regular,
            color: Rgb::BLACK,
            text: SUBTITLE.to_string(),
        });
        ops.push(DrawOp::Text {
            x: geometry.page_width - geometry.margin - 40.0,
            y: 13.0,
            size: 7.0,
            style: FontStyle::Regular,
            color: Rgb::BLACK,
            text: format!("Generated: {}", self.date_label),
        });
        ops.push(DrawOp::Line {
            x1: geometry.margin,
            y1: 18.0,
            x2: geometry.page_width - geometry.margin,
            y2: 18.0,
            width: 0.5,
            color: Rgb::TEAL,
        });
        ops
    }

    fn page_mut(&mut self, page: usize) -> &mut Page {
        while self.pages.len() <= page {
            let ops = self.header_ops();
            self.pages.push(Page { ops });
        }
        &mut self.pages[page]
    }

    fn push(&mut self, page: usize, op: DrawOp) {
        self.page_mut(page).ops.push(op);
    }

    fn text(&mut self, text: &str, indent: f32, size: f32, style: FontStyle, color: Rgb) {
        let line_height = self.geometry().line_height_for(size);
        let ascent = size * PT_TO_MM * 0.8;
        let width = (self.layout.column_width() - indent).max(MIN_TEXT_WIDTH);
        for line in wrap_text(text, width, size, style) {
            let at = self.layout.place(line_height);
            self.push(
                at.page,
                DrawOp::Text {
                    x: at.x + indent,
                    y: at.y + ascent,
                    size,
                    style,
                    color,
                    text: line,
                },
            );
        }
    }

    fn gap(&mut self, height: f32) {
        self.layout.advance(height);
    }

    fn title(&mut self, title: &str) {
        self.layout.ensure_space(10.0);
        self.text(title, 0.0, 16.0, FontStyle::Bold, Rgb::TEAL);
        self.gap(3.0);
    }

    fn subtitle(&mut self, subtitle: &str) {
        self.layout.ensure_space(10.0);
        self.text(subtitle, 0.0, 12.0, FontStyle::Bold, Rgb::BLACK);
        self.gap(2.0);
    }

    fn summary(&mut self, input: &ReportInput<'_>) {
        self.title(REPORT_TITLE);
        let generated = input.generated_at;
        self.text(
            &format!("Generated on: {}", generated.format("%Y-%m-%d")),
            0.0,
            10.0,
            FontStyle::Regular,
            Rgb::BLACK,
        );
        self.text(
            &format!("Export time: {}", generated.format("%H:%M:%S")),
            0.0,
            10.0,
            FontStyle::Regular,
            Rgb::BLACK,
        );
        self.gap(4.0);

        self.subtitle("Applied Filters");
        for line in input.filter_lines {
            let bullet = format!("• {line}");
            self.text(&bullet, 5.0, 9.0, FontStyle::Regular, Rgb::BLACK);
        }
        self.gap(4.0);

        self.subtitle("Overall Statistics");
        self.table(
            &["Metric", "Count", "% Visible", "% All"],
            &OVERALL_WIDTHS,
            &overall_rows(input.summary),
        );

        self.subtitle("Section Breakdown");
        if input.section_stats.is_empty() {
            self.text(NO_SECTIONS, 5.0, 9.0, FontStyle::Regular, Rgb::BLACK);
        } else {
            let rows: Vec<Vec<String>> =
                input.section_stats.iter().map(breakdown_row).collect();
            self.table(
                &["Section", "Total", "C", "AR", "F", "% Total", "% Selected"],
                &BREAKDOWN_WIDTHS,
                &rows,
            );
        }
    }

    fn table(&mut self, headers: &[&str], widths: &[f32], rows: &[Vec<String>]) {
        self.layout.ensure_space(HEADER_ROW_HEIGHT + ROW_HEIGHT);
        let mut page = self.table_header(headers, widths);
        for (idx, row) in rows.iter().enumerate() {
            if self.layout.ensure_space(ROW_HEIGHT).page != page {
                page = self.table_header(headers, widths);
            }
            let at = self.layout.place(ROW_HEIGHT);
            if idx % 2 == 0 {
                self.push(
                    at.page,
                    DrawOp::FillRect {
                        x: at.x,
                        y: at.y,
                        width: widths.iter().sum(),
                        height: ROW_HEIGHT,
                        color: Rgb::LIGHT_GRAY,
                    },
                );
            }
            self.row_cells(
                at.page,
                at.x,
                at.y + ROW_HEIGHT - 1.5,
                row,
                widths,
                7.0,
                FontStyle::Regular,
                Rgb::BLACK,
            );
        }
        self.gap(4.0);
    }

    fn table_header(&mut self, headers: &[&str], widths: &[f32]) -> usize {
        let at = self.layout.place(HEADER_ROW_HEIGHT);
        self.push(
            at.page,
            DrawOp::FillRect {
                x: at.x,
                y: at.y,
                width: widths.iter().sum(),
                height: HEADER_ROW_HEIGHT,
                color: Rgb::TEAL,
            },
        );
        let cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        self.row_cells(
            at.page,
            at.x,
            at.y + HEADER_ROW_HEIGHT - 1.8,
            &cells,
            widths,
            8.0,
            FontStyle::Bold,
            Rgb::WHITE,
        );
        at.page
    }

    #[allow(clippy::too_many_arguments)]
    fn row_cells(
        &mut self,
        page: usize,
        x: f32,
        baseline: f32,
        cells: &[String],
        widths: &[f32],
        size: f32,
        style: FontStyle,
        color: Rgb,
    ) {
        let mut cell_x = x;
        for (cell, width) in cells.iter().zip(widths) {
            self.push(
                page,
                DrawOp::Text {
                    x: cell_x + 2.0,
                    y: baseline,
                    size,
                    style,
                    color,
                    text: fit_text(cell, width - 4.0, size, style),
                },
            );
            cell_x += width;
        }
    }

    fn content_details(&mut self, visible: &ContentTree, columns: ColumnMode) {
        self.layout.break_page();
        self.page_mut(self.layout.page());
        self.title("Content Details");
        self.layout.set_mode(columns);
        if visible.is_empty() {
            self.text(NO_CONTENT, 0.0, 9.0, FontStyle::Regular, Rgb::BLACK);
            return;
        }
        for section in visible.sections() {
            self.section(section);
        }
    }

    fn section(&mut self, section: &Section) {
        self.layout.ensure_space(12.0);
        self.text(&section.clean_heading(), 0.0, 11.0, FontStyle::Bold, Rgb::TEAL);
        self.gap(2.0);
        if let Some(note) = &section.note {
            let note = format!("Note: {note}");
            self.text(&note, 0.0, 7.0, FontStyle::Regular, Rgb::BLACK);
        }
        self.items(&section.items, 0);
        for subsection in &section.subsections {
            self.layout.ensure_space(6.0);
            self.text(&subsection.heading(), 0.0, 9.0, FontStyle::Bold, Rgb::BLACK);
            self.items(&subsection.items, 1);
            for nested in &subsection.sections {
                self.layout.ensure_space(4.0);
                self.text(&nested.title, ITEM_INDENT, 8.0, FontStyle::Bold, Rgb::BLACK);
                self.items(&nested.items, 2);
            }
        }
        self.gap(3.0);
    }

    fn items(&mut self, items: &[Item], level: usize) {
        let indent = level as f32 * ITEM_INDENT;
        for item in items {
            self.text(&item.display_text(), indent, 8.0, FontStyle::Regular, Rgb::BLACK);
            if let Some(note) = &item.note {
                self.text(
                    &format!("Note: {note}"),
                    indent + 3.0,
                    7.0,
                    FontStyle::Regular,
                    Rgb::BLACK,
                );
            }
            self.items(&item.subitems, level + 1);
        }
    }

    fn finish(mut self) -> Vec<Page> {
        let geometry = self.geometry();
        let total = self.pages.len();
        for (idx, page) in self.pages.iter_mut().enumerate() {
            let label = format!("Page {} of {}", idx + 1, total);
            let width = estimate_width(&label, 7.0, FontStyle::Regular);
            page.ops.push(DrawOp::Text {
                x: geometry.page_width - geometry.margin - width,
                y: geometry.page_height - 8.0,
                size: 7.0,
                style: FontStyle::Regular,
                color: Rgb::BLACK,
                text: label,
            });
        }
        self.pages
    }
}

fn overall_rows(summary: &StatsSummary) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec![
            "Visible Designated Items".to_string(),
            summary.total_visible.to_string(),
            format_percentage(percentage(summary.total_visible, summary.total_visible)),
            format_percentage(summary.total_percentage),
        ],
        vec![
            "All Designated Items".to_string(),
            summary.total_all.to_string(),
            "-".to_string(),
            format_percentage(percentage(summary.total_all, summary.total_all)),
        ],
    ];
    for designation in Designation::ALL {
        rows.push(vec![
            designation.label(),
            summary.count(designation).to_string(),
            format_percentage(summary.percentage_of_visible(designation)),
            format_percentage(summary.percentage_of_all(designation)),
        ]);
    }
    rows
}

fn breakdown_row(stats: &SectionStats) -> Vec<String> {
    let indent = "  ".repeat(stats.depth as usize);
    vec![
        format!("{indent}{}", stats.title),
        stats.counts.total.to_string(),
        stats.counts.core.to_string(),
        stats.counts.advanced_resident.to_string(),
        stats.counts.fellow.to_string(),
        format_percentage(stats.percentage_of_total),
        format_percentage(stats.percentage_of_selected),
    ]
}

fn max_chars(width: f32, size: f32, style: FontStyle) -> usize {
    let per_char = style.glyph_em() * size * PT_TO_MM;
    ((width / per_char).floor() as usize).max(1)
}

/// Approximate rendered width in millimetres using an average Helvetica glyph.
pub fn estimate_width(text: &str, size: f32, style: FontStyle) -> f32 {
    text.chars().count() as f32 * style.glyph_em() * size * PT_TO_MM
}

/// Greedy word wrap; words longer than a line are split.
pub fn wrap_text(text: &str, width: f32, size: f32, style: FontStyle) -> Vec<String> {
    let limit = max_chars(width, size, style);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if !current.is_empty() {
            if current.chars().count() + 1 + word_len <= limit {
                current.push(' ');
                current.push_str(word);
                continue;
            }
            lines.push(std::mem::take(&mut current));
        }
        let mut rest: Vec<char> = word.chars().collect();
        while rest.len() > limit {
            lines.push(rest.drain(..limit).collect());
        }
        current = rest.into_iter().collect();
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Truncates `text` with an ellipsis so it fits a table cell.
pub fn fit_text(text: &str, width: f32, size: f32, style: FontStyle) -> String {
    let limit = max_chars(width, size, style);
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{filter, DesignationSet, FilterOptions};
    use crate::model::{SectionType, Subsection};
    use crate::stats::section_stats;
    use chrono::NaiveDate;

    fn generated_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn sample_tree() -> ContentTree {
        let mut section = Section::new(
            SectionType::Ap,
            1,
            "Topics for Anatomic Pathology Residents: The Breast",
        );
        section.items = vec![
            Item::designated("Foo", Designation::Core).with_note("core topic"),
            Item::designated("Bar", Designation::AdvancedResident),
        ];
        let mut sub = Subsection::new("Benign");
        sub.letter = Some("A".to_string());
        sub.items = vec![Item::new("Header only")];
        section.subsections.push(sub);
        ContentTree::new(vec![section])
    }

    fn build(full: &ContentTree, options: &FilterOptions, columns: ColumnMode) -> Report {
        let visible = filter(full, options);
        let summary = StatsSummary::compute(full, &visible);
        let baseline = summary.total_all;
        let rows = section_stats(visible.sections(), baseline);
        let lines = options.describe();
        let input = ReportInput {
            visible: &visible,
            summary: &summary,
            section_stats: &rows,
            filter_lines: &lines,
            generated_at: generated_at(),
        };
        ReportBuilder::new(ReportConfig {
            columns,
            ..Default::default()
        })
        .build(&input)
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_text("alpha beta gamma delta", 10.0, 8.0, FontStyle::Regular);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 7));
        assert_eq!(lines.join(" "), "alpha beta gamma delta");
        assert_eq!(wrap_text("", 50.0, 8.0, FontStyle::Regular), vec![String::new()]);
    }

    #[test]
    fn splits_words_longer_than_a_line() {
        let lines = wrap_text("abcdefghijklmnop", 5.0, 8.0, FontStyle::Regular);
        assert_eq!(lines.concat(), "abcdefghijklmnop");
        assert!(lines.len() >= 4);
    }

    #[test]
    fn fit_text_truncates_with_ellipsis() {
        let fitted = fit_text(&"x".repeat(200), 30.0, 7.0, FontStyle::Regular);
        assert!(fitted.ends_with("..."));
        assert!(fitted.chars().count() <= max_chars(30.0, 7.0, FontStyle::Regular));
        assert_eq!(fit_text("short", 30.0, 7.0, FontStyle::Regular), "short");
    }

    #[test]
    fn summary_then_content_pages() {
        let report = build(&sample_tree(), &FilterOptions::default(), ColumnMode::Two);
        assert_eq!(report.page_count(), 2);
        let first: Vec<&str> = report.pages[0].texts().collect();
        assert!(first.contains(&REPORT_TITLE));
        assert!(first.contains(&"• Content Types: AP, CP"));
        assert!(first.contains(&"Generated on: 2025-06-01"));
        assert!(first.contains(&"Export time: 09:30:00"));
        assert!(first.contains(&"Core (C)"));
        assert!(first.contains(&"50.0%"));
        let second: Vec<&str> = report.pages[1].texts().collect();
        assert!(second.contains(&"Content Details"));
        assert!(second.contains(&"AP 1: Breast"));
        assert!(second.contains(&"Foo [C]"));
        assert!(second.contains(&"Note: core topic"));
        assert!(second.contains(&"A. Benign"));
        assert!(second.contains(&"Header only"));
    }

    #[test]
    fn every_page_repeats_the_header() {
        let mut section = Section::new(SectionType::Cp, 2, "Hematology");
        section.items = (0..400)
            .map(|i| Item::designated(format!("Topic {i}"), Designation::Fellow))
            .collect();
        let report = build(
            &ContentTree::new(vec![section]),
            &FilterOptions::default(),
            ColumnMode::Single,
        );
        assert!(report.page_count() > 3);
        for page in &report.pages {
            let texts: Vec<&str> = page.texts().collect();
            assert_eq!(texts[0], BRAND);
            assert_eq!(texts[1], SUBTITLE);
            assert_eq!(texts[2], "Generated: 2025-06-01");
        }
        let last = report.pages.last().unwrap().texts().last().unwrap().to_string();
        assert_eq!(last, format!("Page {0} of {0}", report.page_count()));
    }

    #[test]
    fn two_columns_use_right_column_before_new_page() {
        let mut section = Section::new(SectionType::Cp, 2, "Hematology");
        section.items = (0..80)
            .map(|i| Item::designated(format!("Topic {i}"), Designation::Fellow))
            .collect();
        let tree = ContentTree::new(vec![section]);
        let report = build(&tree, &FilterOptions::default(), ColumnMode::Two);
        assert_eq!(report.page_count(), 2);
        let right_column_texts = report.pages[1]
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Text { x, .. } if *x >= 110.0 && *x < 150.0))
            .count();
        assert!(right_column_texts > 0);

        let single = build(&tree, &FilterOptions::default(), ColumnMode::Single);
        assert_eq!(single.page_count(), 3);
    }

    #[test]
    fn empty_filter_result_still_reports_zero_statistics() {
        let options = FilterOptions {
            designations: DesignationSet::none(),
            search: "nothing matches this".to_string(),
            ..Default::default()
        };
        let report = build(&sample_tree(), &options, ColumnMode::Two);
        assert_eq!(report.page_count(), 2);
        let text = report.to_plain_text();
        assert!(text.contains(NO_SECTIONS));
        assert!(text.contains(NO_CONTENT));
        assert!(text.contains("Visible Designated Items\n0\n0.0%\n0.0%"));
        assert!(text.contains("Designations: None"));
    }

    #[test]
    fn breakdown_omits_subsections_without_designated_items() {
        let report = build(&sample_tree(), &FilterOptions::default(), ColumnMode::Two);
        let first: Vec<&str> = report.pages[0].texts().collect();
        assert!(!first.iter().any(|t| t.contains("Benign")));
        let second: Vec<&str> = report.pages[1].texts().collect();
        assert!(second.contains(&"A. Benign"));
    }

    #[test]
    fn logo_slot_only_when_logo_present() {
        let visible = sample_tree();
        let summary = StatsSummary::compute(&visible, &visible);
        let input = ReportInput {
            visible: &visible,
            summary: &summary,
            section_stats: &[],
            filter_lines: &[],
            generated_at: generated_at(),
        };
        let plain = ReportBuilder::default().build(&input);
        assert!(!plain.pages[0].ops.iter().any(|op| matches!(op, DrawOp::Image { .. })));

        let logo = Logo::from_bytes(&crate::logo::sample_png()).unwrap();
        let branded = ReportBuilder::default().with_logo(Some(logo)).build(&input);
        assert!(branded
            .pages
            .iter()
            .all(|page| matches!(page.ops[0], DrawOp::Image { .. })));
    }
}
