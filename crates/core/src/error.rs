use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AbpathError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid document: {0}")]
    InvalidDocument(&'static str),
    #[error("invalid section key: {0:?}")]
    InvalidSectionKey(String),
    #[error("unknown designation: {0:?}")]
    UnknownDesignation(String),
    #[error("unknown section type: {0:?}")]
    UnknownSectionType(String),
    #[error("asset not found: {0:?}")]
    MissingAsset(PathBuf),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AbpathError>;
