use std::fs;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use tracing::debug;

use crate::error::Result;
use crate::layout::{PageGeometry, PT_TO_MM};
use crate::logo::Logo;
use crate::report::{DrawOp, FontStyle, Page, Report, Rgb};

const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";
const LOGO_NAME: &str = "Logo";

/// Serializes a [`Report`] display list into a PDF document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfWriter;

impl PdfWriter {
    pub fn write(&self, report: &Report) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(font_dictionary("Helvetica"));
        let bold = doc.add_object(font_dictionary("Helvetica-Bold"));
        let logo_id = report
            .logo
            .as_ref()
            .map(|logo| doc.add_object(image_stream(logo)));

        let mut resources = dictionary! {
            "Font" => dictionary! {
                REGULAR_FONT => regular,
                BOLD_FONT => bold,
            },
        };
        if let Some(id) = logo_id {
            resources.set("XObject", dictionary! { LOGO_NAME => id });
        }
        let resources_id = doc.add_object(resources);

        let geometry = report.geometry;
        let mut kids = Vec::with_capacity(report.pages.len());
        for page in &report.pages {
            let content = Content {
                operations: page_operations(page, &geometry, report.logo.as_ref()),
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![
                real(0.0),
                real(0.0),
                real(to_pt(geometry.page_width)),
                real(to_pt(geometry.page_height)),
            ],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        debug!(
            pages = report.page_count(),
            bytes = bytes.len(),
            "wrote pdf"
        );
        Ok(bytes)
    }

    pub fn save<P: AsRef<Path>>(&self, report: &Report, path: P) -> Result<()> {
        let bytes = self.write(report)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

fn font_dictionary(base: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn image_stream(logo: &Logo) -> Stream {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => logo.width as i64,
        "Height" => logo.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8_i64,
    };
    Stream::new(dict, logo.rgb.clone())
}

fn to_pt(mm: f32) -> f32 {
    mm / PT_TO_MM
}

fn real(value: f32) -> Object {
    Object::Real(value)
}

fn color_operands(color: Rgb) -> Vec<Object> {
    color.unit().into_iter().map(real).collect()
}

fn page_operations(page: &Page, geometry: &PageGeometry, logo: Option<&Logo>) -> Vec<Operation> {
    let flip = |y: f32| to_pt(geometry.page_height - y);
    let mut ops = Vec::new();
    for op in &page.ops {
        match op {
            DrawOp::Text {
                x,
                y,
                size,
                style,
                color,
                text,
            } => {
                let font = match style {
                    FontStyle::Regular => REGULAR_FONT,
                    FontStyle::Bold => BOLD_FONT,
                };
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new("Tf", vec![font.into(), real(*size)]));
                ops.push(Operation::new("rg", color_operands(*color)));
                ops.push(Operation::new("Td", vec![real(to_pt(*x)), real(flip(*y))]));
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
                ));
                ops.push(Operation::new("ET", vec![]));
            }
            DrawOp::FillRect {
                x,
                y,
                width,
                height,
                color,
            } => {
                ops.push(Operation::new("rg", color_operands(*color)));
                ops.push(Operation::new(
                    "re",
                    vec![
                        real(to_pt(*x)),
                        real(flip(y + height)),
                        real(to_pt(*width)),
                        real(to_pt(*height)),
                    ],
                ));
                ops.push(Operation::new("f", vec![]));
            }
            DrawOp::Line {
                x1,
                y1,
                x2,
                y2,
                width,
                color,
            } => {
                ops.push(Operation::new("RG", color_operands(*color)));
                ops.push(Operation::new("w", vec![real(to_pt(*width))]));
                ops.push(Operation::new("m", vec![real(to_pt(*x1)), real(flip(*y1))]));
                ops.push(Operation::new("l", vec![real(to_pt(*x2)), real(flip(*y2))]));
                ops.push(Operation::new("S", vec![]));
            }
            DrawOp::Image { x, y, size } => {
                let Some(logo) = logo else {
                    continue;
                };
                let (width, height) = fit_box(logo, *size);
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new(
                    "cm",
                    vec![
                        real(to_pt(width)),
                        real(0.0),
                        real(0.0),
                        real(to_pt(height)),
                        real(to_pt(*x)),
                        real(flip(y + height)),
                    ],
                ));
                ops.push(Operation::new("Do", vec![Object::Name(LOGO_NAME.as_bytes().to_vec())]));
                ops.push(Operation::new("Q", vec![]));
            }
        }
    }
    ops
}

/// Scales the logo into a `size` square, keeping its aspect ratio.
fn fit_box(logo: &Logo, size: f32) -> (f32, f32) {
    if logo.width == 0 || logo.height == 0 {
        return (size, size);
    }
    let aspect = logo.width as f32 / logo.height as f32;
    if aspect >= 1.0 {
        (size, size / aspect)
    } else {
        (size * aspect, size)
    }
}

/// Maps text onto the WinAnsi code page used by the standard Type1 fonts.
/// Characters outside it become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch {
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            c if (c as u32) < 0x80 => c as u8,
            c if (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PageGeometry;

    fn two_page_report(logo: Option<Logo>) -> Report {
        let text = |text: &str| DrawOp::Text {
            x: 20.0,
            y: 30.0,
            size: 10.0,
            style: FontStyle::Regular,
            color: Rgb::BLACK,
            text: text.to_string(),
        };
        let mut first = Page {
            ops: vec![text("Export Summary")],
        };
        first.ops.push(DrawOp::FillRect {
            x: 20.0,
            y: 40.0,
            width: 170.0,
            height: 6.0,
            color: Rgb::TEAL,
        });
        first.ops.push(DrawOp::Line {
            x1: 20.0,
            y1: 18.0,
            x2: 190.0,
            y2: 18.0,
            width: 0.5,
            color: Rgb::TEAL,
        });
        first.ops.push(DrawOp::Image {
            x: 20.0,
            y: 5.0,
            size: 10.0,
        });
        Report {
            geometry: PageGeometry::default(),
            pages: vec![first, Page { ops: vec![text("Content Details")] }],
            logo,
        }
    }

    #[test]
    fn writes_one_pdf_page_per_report_page() {
        let bytes = PdfWriter.write(&two_page_report(None)).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn embeds_logo_as_image_xobject() {
        let logo = Logo::from_bytes(&crate::logo::sample_png()).unwrap();
        let bytes = PdfWriter.write(&two_page_report(Some(logo))).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let has_image = doc.objects.values().any(|object| match object {
            Object::Stream(stream) => stream
                .dict
                .get(b"Subtype")
                .and_then(|subtype| subtype.as_name())
                .map(|name| name == b"Image")
                .unwrap_or(false),
            _ => false,
        });
        assert!(has_image);
    }

    #[test]
    fn save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        PdfWriter.save(&two_page_report(None), &path).unwrap();
        assert!(fs::read(&path).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn win_ansi_maps_typographic_characters() {
        assert_eq!(encode_win_ansi("• AR – é"), vec![0x95, b' ', b'A', b'R', b' ', 0x96, b' ', 0xE9]);
        assert_eq!(encode_win_ansi("µ→"), vec![0xB5, b'?']);
    }

    #[test]
    fn logo_keeps_aspect_ratio() {
        let wide = Logo {
            width: 40,
            height: 20,
            rgb: vec![0; 40 * 20 * 3],
        };
        assert_eq!(fit_box(&wide, 10.0), (10.0, 5.0));
    }
}
