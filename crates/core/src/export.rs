use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AbpathError, Result};
use crate::filter::{filter, FilterOptions};
use crate::logo::Logo;
use crate::model::{ContentTree, Designation};
use crate::pdf::PdfWriter;
use crate::report::{Report, ReportBuilder, ReportConfig, ReportInput};
use crate::stats::{section_stats, StatsSummary};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Pdf,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Text => "txt",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Text => "text/plain; charset=utf-8",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = AbpathError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "text" | "txt" => Ok(ExportFormat::Text),
            other => Err(AbpathError::Other(format!("unknown export format {other}"))),
        }
    }
}

/// `abpath-content_<date>` followed by the active type and designation toggles.
pub fn export_stem(date: NaiveDate, options: &FilterOptions) -> String {
    let types = &options.section_types;
    let type_part = match (types.ap, types.cp) {
        (true, true) => "AP-CP",
        (true, false) => "AP",
        (false, true) => "CP",
        (false, false) => "",
    };
    let designation_part = options
        .designations
        .iter()
        .map(|designation: Designation| designation.code())
        .collect::<Vec<_>>()
        .join("-");
    let mut stem = format!("abpath-content_{}", date.format("%Y-%m-%d"));
    for part in [type_part, designation_part.as_str()] {
        if !part.is_empty() {
            stem.push('_');
            stem.push_str(part);
        }
    }
    stem
}

pub fn export_filename(date: NaiveDate, options: &FilterOptions) -> String {
    format!("{}.{}", export_stem(date, options), ExportFormat::Pdf.extension())
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub summary: StatsSummary,
    pub page_count: usize,
}

impl ExportArtifact {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Runs filter, aggregation and report building over a loaded tree.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    builder: ReportBuilder,
}

impl Exporter {
    pub fn new(config: ReportConfig) -> Self {
        Self {
            builder: ReportBuilder::new(config),
        }
    }

    pub fn with_logo(mut self, logo: Option<Logo>) -> Self {
        self.builder = self.builder.with_logo(logo);
        self
    }

    pub fn prepare(
        &self,
        full: &ContentTree,
        options: &FilterOptions,
        generated_at: NaiveDateTime,
    ) -> (Report, StatsSummary) {
        let visible = filter(full, options);
        let summary = StatsSummary::compute(full, &visible);
        let rows = section_stats(visible.sections(), summary.total_all);
        let filter_lines = options.describe();
        let input = ReportInput {
            visible: &visible,
            summary: &summary,
            section_stats: &rows,
            filter_lines: &filter_lines,
            generated_at,
        };
        (self.builder.build(&input), summary)
    }

    pub fn export(
        &self,
        full: &ContentTree,
        options: &FilterOptions,
        generated_at: NaiveDateTime,
        format: ExportFormat,
    ) -> Result<ExportArtifact> {
        let (report, summary) = self.prepare(full, options, generated_at);
        let bytes = match format {
            ExportFormat::Pdf => PdfWriter.write(&report)?,
            ExportFormat::Text => report.to_plain_text().into_bytes(),
        };
        let filename = format!(
            "{}.{}",
            export_stem(generated_at.date(), options),
            format.extension()
        );
        info!(
            %filename,
            pages = report.page_count(),
            visible = summary.total_visible,
            "exported content specification"
        );
        Ok(ExportArtifact {
            filename,
            format,
            bytes,
            summary,
            page_count: report.page_count(),
        })
    }
}
