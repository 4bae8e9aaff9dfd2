use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use abpath_core::{
    filter, listed_item_count, paginate, section_stats, ColumnMode, ContentSpecDocument,
    DesignationSet, ExportFormat, Exporter, FilterOptions, Logo, Metadata, PaginationInfo,
    ReportConfig, Section, SectionKey, SectionOption, SectionQuery, SectionStats, SectionType,
    SectionTypeSet, StatsSummary, DEFAULT_SECTIONS_PER_PAGE,
};

const DEFAULT_CONFIG: &str = "abpath-service.toml";
const DEFAULT_SOURCE: &str = "abpath-content-specs.json";

struct AppState {
    doc: ContentSpecDocument,
    exporter: Exporter,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let config = load_service_config();
    let source = std::env::var("ABPATH_SOURCE")
        .map(PathBuf::from)
        .ok()
        .or_else(|| config.source.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE));
    let doc = ContentSpecDocument::load_json(&source)?;
    let columns = match config.columns.as_deref() {
        Some(raw) => raw.parse::<ColumnMode>()?,
        None => ColumnMode::default(),
    };
    let exporter = Exporter::new(ReportConfig {
        columns,
        ..Default::default()
    })
    .with_logo(Logo::load_optional(config.logo.as_ref()));
    let state = Arc::new(AppState { doc, exporter });
    let app = router(state);
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr, source = %source.display());
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/content-specifications", get(handle_document))
        .route("/api/content-specifications/sections", get(handle_sections))
        .route("/api/content-specifications/paginated", get(handle_paginated))
        .route("/api/content-specifications/stats", get(handle_stats))
        .route("/api/content-specifications/export", get(handle_export))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct ServiceConfig {
    source: Option<PathBuf>,
    logo: Option<PathBuf>,
    columns: Option<String>,
}

fn load_service_config() -> ServiceConfig {
    let config_path =
        std::env::var("ABPATH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let path = Path::new(&config_path);
    if !path.exists() {
        return ServiceConfig::default();
    }
    match fs::read_to_string(path) {
        Ok(contents) => toml::from_str::<ServiceConfig>(&contents).unwrap_or_else(|err| {
            warn!(path = %path.display(), "ignoring invalid config: {err}");
            ServiceConfig::default()
        }),
        Err(err) => {
            warn!(path = %path.display(), "ignoring unreadable config: {err}");
            ServiceConfig::default()
        }
    }
}

/// Toggle-style filter parameters; every toggle defaults to on.
#[derive(Debug, Default, Deserialize)]
struct FilterParams {
    search: Option<String>,
    ap: Option<bool>,
    cp: Option<bool>,
    c: Option<bool>,
    ar: Option<bool>,
    f: Option<bool>,
    /// Comma separated section keys, `ap-3` or `AP_3`.
    sections: Option<String>,
    format: Option<String>,
}

impl FilterParams {
    fn to_options(&self) -> Result<FilterOptions, AppError> {
        let sections = self
            .sections
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| raw.parse::<SectionKey>().map_err(AppError::bad_request))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FilterOptions {
            search: self.search.clone().unwrap_or_default(),
            designations: DesignationSet {
                core: self.c.unwrap_or(true),
                advanced_resident: self.ar.unwrap_or(true),
                fellow: self.f.unwrap_or(true),
            },
            section_types: SectionTypeSet {
                ap: self.ap.unwrap_or(true),
                cp: self.cp.unwrap_or(true),
            },
            sections,
        })
    }

    fn format(&self) -> Result<ExportFormat, AppError> {
        match self.format.as_deref() {
            Some(raw) => raw.parse().map_err(AppError::bad_request),
            None => Ok(ExportFormat::Pdf),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginatedParams {
    page: Option<usize>,
    sections_per_page: Option<usize>,
    #[serde(rename = "type")]
    kind: Option<String>,
    category: Option<String>,
    search: Option<String>,
}

impl PaginatedParams {
    fn to_query(&self) -> Result<SectionQuery, AppError> {
        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(raw.parse::<SectionType>().map_err(AppError::bad_request)?),
        };
        let category = match self.category.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(raw.parse::<SectionKey>().map_err(AppError::bad_request)?),
        };
        Ok(SectionQuery {
            kind,
            category,
            search: self.search.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SectionsResponse {
    sections: Vec<SectionOption>,
    metadata: Metadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaginatedResponse {
    sections: Vec<Section>,
    pagination: PaginationInfo,
    metadata: PageMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageMetadata {
    #[serde(flatten)]
    source: Metadata,
    total_items: usize,
    page_items: usize,
    filters: AppliedFilters,
}

#[derive(Debug, Serialize)]
struct AppliedFilters {
    #[serde(rename = "type")]
    kind: String,
    category: String,
    search: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    filters: Vec<String>,
    summary: StatsSummary,
    sections: Vec<SectionStats>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_document(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.doc.to_json_value())
}

async fn handle_sections(State(state): State<Arc<AppState>>) -> Json<SectionsResponse> {
    Json(SectionsResponse {
        sections: state.doc.tree.section_options(),
        metadata: state.doc.metadata.clone(),
    })
}

async fn handle_paginated(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginatedParams>,
) -> Result<Json<PaginatedResponse>, AppError> {
    let query = params.to_query()?;
    let selected = query.select(&state.doc.tree);
    let page = paginate(
        &selected,
        params.page.unwrap_or(1),
        params.sections_per_page.unwrap_or(DEFAULT_SECTIONS_PER_PAGE),
    );
    let label = |raw: &Option<String>| {
        raw.as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or("all")
            .to_string()
    };
    Ok(Json(PaginatedResponse {
        sections: page.sections.to_vec(),
        pagination: page.pagination,
        metadata: PageMetadata {
            source: state.doc.metadata.clone(),
            total_items: listed_item_count(&selected),
            page_items: listed_item_count(page.sections),
            filters: AppliedFilters {
                kind: label(&params.kind),
                category: label(&params.category),
                search: params.search.clone().filter(|s| !s.trim().is_empty()),
            },
        },
    }))
}

async fn handle_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> Result<Json<StatsResponse>, AppError> {
    let options = params.to_options()?;
    let visible = filter(&state.doc.tree, &options);
    let summary = StatsSummary::compute(&state.doc.tree, &visible);
    Ok(Json(StatsResponse {
        filters: options.describe(),
        sections: section_stats(visible.sections(), summary.total_all),
        summary,
    }))
}

async fn handle_export(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> Result<Response, AppError> {
    let options = params.to_options()?;
    let format = params.format()?;
    let generated_at = chrono::Local::now().naive_local();
    let artifact = task::spawn_blocking(move || {
        state
            .exporter
            .export(&state.doc.tree, &options, generated_at, format)
    })
    .await
    .map_err(AppError::internal)?
    .map_err(AppError::internal)?;
    let headers = [
        (CONTENT_TYPE, artifact.content_type().to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.filename),
        ),
    ];
    Ok((headers, artifact.bytes).into_response())
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }

    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
