mod error;
mod export;
mod filter;
mod layout;
mod logo;
mod model;
mod paginate;
mod pdf;
mod report;
mod source;
mod stats;

pub use error::{AbpathError, Result};
pub use export::{export_filename, export_stem, ExportArtifact, ExportFormat, Exporter};
pub use filter::{filter, DesignationSet, FilterOptions, SectionTypeSet};
pub use layout::{Column, ColumnMode, PageGeometry, PageLayout, Placement, PT_TO_MM};
pub use logo::Logo;
pub use model::{
    ContentTree, Designation, Item, NestedSection, Section, SectionKey, SectionOption,
    SectionType, Subsection,
};
pub use paginate::{
    listed_item_count, paginate, PaginationInfo, SectionPage, SectionQuery,
    DEFAULT_SECTIONS_PER_PAGE,
};
pub use pdf::{encode_win_ansi, PdfWriter};
pub use report::{
    estimate_width, fit_text, wrap_text, DrawOp, FontStyle, Page, Report, ReportBuilder,
    ReportConfig, ReportInput, Rgb, BRAND, NO_CONTENT, NO_SECTIONS, REPORT_TITLE, SUBTITLE,
};
pub use source::{ContentSpecDocument, Metadata};
pub use stats::{
    aggregate, format_percentage, percentage, section_stats, DesignationCounts, SectionStats,
    StatsSummary,
};
