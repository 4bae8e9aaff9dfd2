use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use abpath_core::{
    filter, format_percentage, paginate, section_stats, ColumnMode, ContentSpecDocument,
    ContentTree, Designation, DesignationSet, ExportFormat, Exporter, FilterOptions, Logo,
    ReportConfig, SectionKey, SectionTypeSet, StatsSummary, DEFAULT_SECTIONS_PER_PAGE,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG: &str = "abpath.toml";
const DEFAULT_SOURCE: &str = "abpath-content-specs.json";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "abpath", version = VERSION, about = "ABPath content specification toolkit")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path or http(s) URL of the content specification JSON.
    #[arg(long, global = true)]
    source: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List sections with their direct item counts, one page at a time.
    Sections {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long = "per-page")]
        per_page: Option<usize>,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the pruned tree for a set of filters.
    Filter {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "outline")]
        json: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        outline: bool,
    },
    /// Designation statistics for a set of filters.
    Stats {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Render the filtered specification to a paginated document.
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, conflicts_with = "out_dir")]
        out: Option<PathBuf>,
        #[arg(long = "out-dir")]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        format: Option<String>,
        /// Header logo, as a local path or http(s) URL.
        #[arg(long)]
        logo: Option<String>,
        #[arg(long)]
        columns: Option<String>,
        #[arg(long, action = ArgAction::SetTrue)]
        quiet: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    search: Option<String>,
    /// Comma separated section types, e.g. `ap,cp`.
    #[arg(long)]
    types: Option<String>,
    /// Comma separated designation codes, e.g. `C,AR`; `none` disables all.
    #[arg(long)]
    designations: Option<String>,
    /// Section key such as `ap-3`; repeat to select several.
    #[arg(long = "section")]
    sections: Vec<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let file_config = load_config(&config_path)?;
    let source = resolve_source(cli.source.as_deref(), &file_config.source);
    let doc = load_document(&source)?;

    match cli.command {
        Commands::Sections {
            page,
            per_page,
            json,
        } => {
            let per_page = per_page.unwrap_or(DEFAULT_SECTIONS_PER_PAGE);
            let page = paginate(doc.tree.sections(), page, per_page);
            let options = ContentTree::new(page.sections.to_vec()).section_options();
            if json {
                let value = json!({
                    "sections": options,
                    "pagination": page.pagination,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for option in &options {
                    println!("{:<8} {}", option.key.to_string(), option.label);
                }
                println!(
                    "[ABPath] Page {} of {} ({} sections)",
                    page.pagination.current_page,
                    page.pagination.total_pages,
                    page.pagination.total_sections
                );
            }
        }
        Commands::Filter {
            filter: args,
            json,
            outline,
        } => {
            let options = resolve_filter(&args, &file_config.filter)?;
            let visible = filter(&doc.tree, &options);
            if json {
                let filtered = ContentSpecDocument::new(visible, doc.metadata.clone());
                println!("{}", serde_json::to_string_pretty(&filtered.to_json_value())?);
            } else if outline {
                println!("{}", visible.outline());
            } else {
                for section in visible.sections() {
                    let count = section.direct_item_count();
                    println!(
                        "{:<8} {} ({count} items)",
                        section.key().to_string(),
                        section.heading()
                    );
                }
                println!(
                    "[ABPath] {} of {} sections match",
                    visible.len(),
                    doc.tree.len()
                );
            }
        }
        Commands::Stats {
            filter: args,
            json,
        } => {
            let options = resolve_filter(&args, &file_config.filter)?;
            let visible = filter(&doc.tree, &options);
            let summary = StatsSummary::compute(&doc.tree, &visible);
            let rows = section_stats(visible.sections(), summary.total_all);
            if json {
                let value = json!({
                    "filters": options.describe(),
                    "summary": summary,
                    "sections": rows,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_stats_summary(&summary);
                for row in &rows {
                    println!(
                        "{}{:<60} {:>4} {:>7} {:>7}",
                        "  ".repeat(row.depth as usize),
                        row.title,
                        row.counts.total,
                        format_percentage(row.percentage_of_total),
                        format_percentage(row.percentage_of_selected)
                    );
                }
            }
        }
        Commands::Export {
            filter: args,
            out,
            out_dir,
            format,
            logo,
            columns,
            quiet,
        } => {
            let options = resolve_filter(&args, &file_config.filter)?;
            let defaults = &file_config.export;
            let format = format
                .as_deref()
                .or(defaults.format.as_deref())
                .map(|raw| raw.parse::<ExportFormat>())
                .transpose()?
                .unwrap_or_default();
            let columns = columns
                .as_deref()
                .or(defaults.columns.as_deref())
                .map(|raw| raw.parse::<ColumnMode>())
                .transpose()?
                .unwrap_or_default();
            let logo = logo
                .as_deref()
                .or(defaults.logo.as_deref())
                .and_then(fetch_logo);
            let exporter = Exporter::new(ReportConfig {
                columns,
                ..Default::default()
            })
            .with_logo(logo);
            let generated_at = chrono::Local::now().naive_local();
            let artifact = exporter.export(&doc.tree, &options, generated_at, format)?;
            let target = match out {
                Some(path) => path,
                None => out_dir
                    .or_else(|| defaults.output_dir.clone())
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(&artifact.filename),
            };
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(&target, &artifact.bytes)
                .with_context(|| format!("failed to write {}", target.display()))?;
            if !quiet {
                println!("[ABPath] Source:   {}", source.describe());
                print_stats_summary(&artifact.summary);
                println!("[ABPath] Pages:    {}", artifact.page_count);
                println!("[ABPath] Written:  {}", target.display());
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_stats_summary(summary: &StatsSummary) {
    println!(
        "[ABPath] Visible:  {} of {} designated items ({})",
        summary.total_visible,
        summary.total_all,
        format_percentage(summary.total_percentage)
    );
    for designation in Designation::ALL {
        println!(
            "[ABPath] {:<8}  {:>4}  {:>6} of visible  {:>6} of all",
            designation.code(),
            summary.count(designation),
            format_percentage(summary.percentage_of_visible(designation)),
            format_percentage(summary.percentage_of_all(designation))
        );
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config: {e}"))
}

#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    #[serde(default)]
    source: SourceDefaults,
    #[serde(default)]
    filter: FilterDefaults,
    #[serde(default)]
    export: ExportDefaults,
}

#[derive(Debug, Default, Deserialize)]
struct SourceDefaults {
    path: Option<PathBuf>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterDefaults {
    search: Option<String>,
    types: Option<String>,
    designations: Option<String>,
    sections: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportDefaults {
    logo: Option<String>,
    columns: Option<String>,
    format: Option<String>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceLocation {
    File(PathBuf),
    Url(String),
}

impl SourceLocation {
    fn parse(raw: &str) -> Self {
        if is_url(raw) {
            SourceLocation::Url(raw.to_string())
        } else {
            SourceLocation::File(PathBuf::from(raw))
        }
    }

    fn describe(&self) -> String {
        match self {
            SourceLocation::File(path) => path.display().to_string(),
            SourceLocation::Url(url) => url.clone(),
        }
    }
}

fn is_url(raw: &str) -> bool {
    raw.starts_with("http://") || raw.starts_with("https://")
}

fn resolve_source(cli: Option<&str>, defaults: &SourceDefaults) -> SourceLocation {
    if let Some(raw) = cli {
        return SourceLocation::parse(raw);
    }
    if let Some(url) = &defaults.url {
        return SourceLocation::Url(url.clone());
    }
    SourceLocation::File(
        defaults
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE)),
    )
}

fn load_document(source: &SourceLocation) -> Result<ContentSpecDocument> {
    match source {
        SourceLocation::File(path) => ContentSpecDocument::load_json(path).with_context(|| {
            format!(
                "failed to load content specifications from {}",
                path.display()
            )
        }),
        SourceLocation::Url(url) => {
            let bytes = http_get(url)
                .with_context(|| format!("failed to load content specifications from {url}"))?;
            let doc = ContentSpecDocument::from_slice(&bytes)
                .with_context(|| format!("invalid content specifications at {url}"))?;
            info!(%url, sections = doc.tree.len(), "loaded content specifications");
            Ok(doc)
        }
    }
}

fn http_get(url: &str) -> Result<Vec<u8>> {
    let client = HttpClient::builder().timeout(HTTP_TIMEOUT).build()?;
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        bail!("request to {url} failed with status {status}");
    }
    Ok(response.bytes()?.to_vec())
}

/// Best-effort logo fetch; failures are logged and the export continues without it.
fn fetch_logo(raw: &str) -> Option<Logo> {
    if !is_url(raw) {
        return Logo::load_optional(Some(raw));
    }
    match http_get(raw) {
        Ok(bytes) => Logo::decode_optional(&bytes),
        Err(err) => {
            warn!(url = raw, "logo unavailable: {err:#}");
            None
        }
    }
}

fn resolve_filter(cli: &FilterArgs, defaults: &FilterDefaults) -> Result<FilterOptions> {
    let search = cli
        .search
        .clone()
        .or_else(|| defaults.search.clone())
        .unwrap_or_default();
    let designations = cli
        .designations
        .as_deref()
        .or(defaults.designations.as_deref())
        .map(|raw| raw.parse::<DesignationSet>())
        .transpose()?
        .unwrap_or_default();
    let section_types = cli
        .types
        .as_deref()
        .or(defaults.types.as_deref())
        .map(|raw| raw.parse::<SectionTypeSet>())
        .transpose()?
        .unwrap_or_default();
    let raw_sections = if cli.sections.is_empty() {
        defaults.sections.clone().unwrap_or_default()
    } else {
        cli.sections.clone()
    };
    let sections = raw_sections
        .iter()
        .map(|raw| raw.parse::<SectionKey>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(FilterOptions {
        search,
        designations,
        section_types,
        sections,
    })
}
