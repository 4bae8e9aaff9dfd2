use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{AbpathError, Result};

/// Header graphic decoded to raw 8-bit RGB samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logo {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Logo {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Self {
            width,
            height,
            rgb: rgb.into_raw(),
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AbpathError::MissingAsset(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Best-effort load: any failure is logged and the export proceeds without a logo.
    pub fn load_optional<P: AsRef<Path>>(path: Option<P>) -> Option<Self> {
        let path = path?;
        match Self::load(path.as_ref()) {
            Ok(logo) => Some(logo),
            Err(err) => {
                warn!(path = %path.as_ref().display(), "logo unavailable: {err}");
                None
            }
        }
    }

    pub fn decode_optional(bytes: &[u8]) -> Option<Self> {
        match Self::from_bytes(bytes) {
            Ok(logo) => Some(logo),
            Err(err) => {
                warn!("logo unavailable: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_png() -> Vec<u8> {
    let mut img = image::RgbImage::new(2, 2);
    img.put_pixel(0, 0, image::Rgb([20, 184, 166]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}
