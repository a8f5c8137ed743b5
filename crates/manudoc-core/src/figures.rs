//! Figure merge unit
//!
//! Embeds figure images as inline pictures. Each figure becomes a centred
//! paragraph holding its picture(s) followed by a `Figure N:` caption. Images
//! are stored under `word/media/` with a relationship from the story part.
//!
//! Pictures are sized from their pixel dimensions at 96 DPI and scaled down
//! to the configured maximum width.

use crate::config::GeneratorConfig;
use crate::error::{FigureError, ManudocError, Result, Warning};
use crate::package::{DocxPackage, IMAGE_RELATIONSHIP};
use crate::payload::{FigureFragment, FigureSource};
use crate::style::{caption_paragraph, Alignment, ParagraphFormat};
use crate::xml::{XmlElement, XmlNode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{GenericImageView, ImageFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;

/// EMUs per pixel at 96 DPI
pub const EMU_PER_PIXEL: u64 = 9525;

/// Outline width of embedded pictures, in EMUs
const OUTLINE_WIDTH_EMU: &str = "9525";

const DRAWING_MAIN_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PICTURE_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

/// Namespace declarations needed on the story root for inline pictures
pub const DRAWING_NAMESPACES: &[(&str, &str)] = &[
    (
        "xmlns:wp",
        "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing",
    ),
    (
        "xmlns:r",
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
    ),
];

static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["'](data:image/[^"']+)["']"#).expect("valid img regex")
});
static DATA_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:([\w.+-]+/[\w.+-]+)?((?:;[^;,]*)*?);base64,(.*)$").expect("valid data uri regex")
});

/// Allocator for `wp:docPr` ids, unique across the document's story parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DrawingIds {
    next: u32,
}

impl Default for DrawingIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl DrawingIds {
    /// Start after the largest `wp:docPr` id already present under `root`
    #[must_use = "returns an id allocator"]
    pub fn after_existing(root: &XmlElement) -> Self {
        let mut max = 0;
        root.walk(&mut |e| {
            if e.is("wp:docPr") {
                if let Some(id) = e.attr("id").and_then(|v| v.parse::<u32>().ok()) {
                    max = max.max(id);
                }
            }
        });
        Self { next: max + 1 }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// A decoded image ready to embed
#[derive(Debug, Clone, PartialEq, Eq)]
struct PreparedImage {
    data: Vec<u8>,
    extension: &'static str,
    content_type: &'static str,
    width_emu: u64,
    height_emu: u64,
}

/// Builds figure content for the `{{figures}}` location
#[derive(Debug, Clone, Copy)]
pub struct FigureMergeUnit<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> FigureMergeUnit<'a> {
    /// Merge unit using the given configuration
    #[inline]
    #[must_use = "creates a figure merge unit"]
    pub const fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    /// Embed the images of all figures and return the body elements
    ///
    /// Figures are ordered by their ordering index. Ties keep submission
    /// order, and figures without an index follow the indexed ones in
    /// submission order. A figure whose image cannot be read is skipped and
    /// reported in `warnings`.
    ///
    /// # Errors
    ///
    /// Returns `Figure` for the first unreadable figure when `strict_figures`
    /// is set, or a package error if the media cannot be registered.
    pub fn build(
        &self,
        package: &mut DocxPackage,
        source_part: &str,
        fragments: &[FigureFragment],
        ids: &mut DrawingIds,
        warnings: &mut Vec<Warning>,
    ) -> Result<Vec<XmlElement>> {
        let mut order: Vec<(usize, &FigureFragment)> = fragments.iter().enumerate().collect();
        order.sort_by_key(|(_, f)| (f.order.is_none(), f.order.unwrap_or_default()));

        let mut out = Vec::new();
        let mut number = 0;
        for (i, fragment) in order {
            let images = match self.prepare(fragment) {
                Ok(images) => images,
                Err(reason) => {
                    let error = FigureError {
                        index: i + 1,
                        caption: fragment.caption.clone(),
                        reason,
                    };
                    if self.config.strict_figures {
                        return Err(ManudocError::Figure(error));
                    }
                    log::warn!("{error}");
                    warnings.push(Warning::Figure(error));
                    continue;
                }
            };

            number += 1;
            let mut picture_paragraph = XmlElement::new("w:p");
            if let Some(ppr) = ParagraphFormat::default()
                .aligned(Alignment::Center)
                .to_element()
            {
                picture_paragraph.children.push(XmlNode::Element(ppr));
            }
            for image in images {
                let run = self.embed(package, source_part, &image, ids, fragment.caption.as_deref())?;
                picture_paragraph.children.push(XmlNode::Element(run));
            }
            out.push(picture_paragraph);

            let caption_format = ParagraphFormat::default()
                .styled(&self.config.caption_style)
                .aligned(Alignment::Center)
                .spaced(6, 6);
            out.push(caption_paragraph(
                &format!("Figure {number}"),
                fragment.caption.as_deref(),
                &caption_format,
            ));
        }
        log::debug!("Embedded {number} of {} figures", fragments.len());
        Ok(out)
    }

    /// Decode every image of a figure; any failure rejects the whole figure
    fn prepare(&self, fragment: &FigureFragment) -> std::result::Result<Vec<PreparedImage>, String> {
        let sources = match &fragment.source {
            None => return Err("no image data".to_string()),
            Some(FigureSource::Bytes(bytes)) => vec![bytes.clone()],
            Some(FigureSource::Path(path)) => vec![std::fs::read(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?],
            Some(FigureSource::Base64(data)) => vec![decode_base64(data)?],
            Some(FigureSource::DataUri(uri)) => vec![decode_data_uri(uri)?],
            Some(FigureSource::Html(html)) => {
                let uris: Vec<&str> = IMG_SRC_RE
                    .captures_iter(html)
                    .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
                    .collect();
                if uris.is_empty() {
                    return Err("no embedded image found".to_string());
                }
                uris.into_iter().map(decode_data_uri).collect::<std::result::Result<_, _>>()?
            }
        };
        sources.into_iter().map(|bytes| self.decode(bytes)).collect()
    }

    fn decode(&self, bytes: Vec<u8>) -> std::result::Result<PreparedImage, String> {
        let format = image::guess_format(&bytes).map_err(|e| format!("unrecognised image data: {e}"))?;
        let decoded = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| format!("corrupt image data: {e}"))?;
        let (width_px, height_px) = decoded.dimensions();
        if width_px == 0 || height_px == 0 {
            return Err("image has no pixels".to_string());
        }

        let (data, extension, content_type) = match format {
            ImageFormat::Png => (bytes, "png", "image/png"),
            ImageFormat::Jpeg => (bytes, "jpeg", "image/jpeg"),
            ImageFormat::Gif => (bytes, "gif", "image/gif"),
            ImageFormat::Bmp => (bytes, "bmp", "image/bmp"),
            ImageFormat::Tiff => (bytes, "tiff", "image/tiff"),
            other => {
                log::debug!("Re-encoding {other:?} figure as PNG");
                let mut png = Cursor::new(Vec::new());
                decoded
                    .write_to(&mut png, ImageFormat::Png)
                    .map_err(|e| format!("cannot re-encode image: {e}"))?;
                (png.into_inner(), "png", "image/png")
            }
        };

        let (width_emu, height_emu) = fit_width(
            u64::from(width_px) * EMU_PER_PIXEL,
            u64::from(height_px) * EMU_PER_PIXEL,
            self.config.max_figure_width_emu(),
        );
        Ok(PreparedImage {
            data,
            extension,
            content_type,
            width_emu,
            height_emu,
        })
    }

    fn embed(
        &self,
        package: &mut DocxPackage,
        source_part: &str,
        image: &PreparedImage,
        ids: &mut DrawingIds,
        description: Option<&str>,
    ) -> Result<XmlElement> {
        let part_name = package.unique_part_name("word/media/image", image.extension);
        let file_name = part_name.rsplit('/').next().unwrap_or(&part_name).to_string();
        package.set_part(part_name.as_str(), image.data.clone());
        package.ensure_default_content_type(image.extension, image.content_type)?;
        let rel_id = package.add_relationship(
            source_part,
            IMAGE_RELATIONSHIP,
            &relative_target(source_part, &part_name),
        )?;
        log::debug!("Embedded {part_name} as {rel_id}");

        let id = ids.allocate();
        Ok(XmlElement::new("w:r").with_child(XmlElement::new("w:drawing").with_child(inline_picture(
            id,
            &file_name,
            &rel_id,
            image.width_emu,
            image.height_emu,
            description.unwrap_or_default(),
        ))))
    }
}

/// Scale `(width, height)` down proportionally so width does not exceed `max_width`
#[must_use = "returns the fitted size"]
pub fn fit_width(width: u64, height: u64, max_width: u64) -> (u64, u64) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let height = u64::try_from(u128::from(height) * u128::from(max_width) / u128::from(width)).unwrap_or(height);
    (max_width, height.max(1))
}

/// Add the drawing namespace declarations to a story root when missing
pub fn ensure_namespaces(root: &mut XmlElement) {
    for (key, value) in DRAWING_NAMESPACES {
        if root.attr(key).is_none() {
            root.set_attr(*key, *value);
        }
    }
}

fn relative_target(source_part: &str, target_part: &str) -> String {
    match source_part.rsplit_once('/') {
        Some((dir, _)) => target_part
            .strip_prefix(&format!("{dir}/"))
            .map_or_else(|| format!("/{target_part}"), str::to_string),
        None => target_part.to_string(),
    }
}

fn decode_base64(data: &str) -> std::result::Result<Vec<u8>, String> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| format!("invalid base64 data: {e}"))
}

fn decode_data_uri(uri: &str) -> std::result::Result<Vec<u8>, String> {
    let caps = DATA_URI_RE
        .captures(uri.trim())
        .ok_or_else(|| "not a base64 data URI".to_string())?;
    decode_base64(caps.get(3).map_or("", |m| m.as_str()))
}

fn inline_picture(id: u32, file_name: &str, rel_id: &str, cx: u64, cy: u64, description: &str) -> XmlElement {
    let cx = cx.to_string();
    let cy = cy.to_string();
    let extent = |name: &str| {
        XmlElement::new(name)
            .with_attr("cx", cx.as_str())
            .with_attr("cy", cy.as_str())
    };

    let mut doc_pr = XmlElement::new("wp:docPr")
        .with_attr("id", id.to_string())
        .with_attr("name", format!("Picture {id}"));
    if !description.is_empty() {
        doc_pr.set_attr("descr", description);
    }

    let outline = XmlElement::new("a:ln").with_attr("w", OUTLINE_WIDTH_EMU).with_child(
        XmlElement::new("a:solidFill").with_child(XmlElement::new("a:srgbClr").with_attr("val", "000000")),
    );

    let pic = XmlElement::new("pic:pic")
        .with_attr("xmlns:pic", PICTURE_NS)
        .with_child(
            XmlElement::new("pic:nvPicPr")
                .with_child(
                    XmlElement::new("pic:cNvPr")
                        .with_attr("id", "0")
                        .with_attr("name", file_name),
                )
                .with_child(XmlElement::new("pic:cNvPicPr")),
        )
        .with_child(
            XmlElement::new("pic:blipFill")
                .with_child(XmlElement::new("a:blip").with_attr("r:embed", rel_id))
                .with_child(XmlElement::new("a:stretch").with_child(XmlElement::new("a:fillRect"))),
        )
        .with_child(
            XmlElement::new("pic:spPr")
                .with_child(
                    XmlElement::new("a:xfrm")
                        .with_child(XmlElement::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                        .with_child(extent("a:ext")),
                )
                .with_child(
                    XmlElement::new("a:prstGeom")
                        .with_attr("prst", "rect")
                        .with_child(XmlElement::new("a:avLst")),
                )
                .with_child(outline),
        );

    XmlElement::new("wp:inline")
        .with_attr("distT", "0")
        .with_attr("distB", "0")
        .with_attr("distL", "0")
        .with_attr("distR", "0")
        .with_child(extent("wp:extent"))
        .with_child(
            XmlElement::new("wp:effectExtent")
                .with_attr("l", "0")
                .with_attr("t", "0")
                .with_attr("r", "0")
                .with_attr("b", "0"),
        )
        .with_child(doc_pr)
        .with_child(
            XmlElement::new("wp:cNvGraphicFramePr").with_child(
                XmlElement::new("a:graphicFrameLocks")
                    .with_attr("xmlns:a", DRAWING_MAIN_NS)
                    .with_attr("noChangeAspect", "1"),
            ),
        )
        .with_child(
            XmlElement::new("a:graphic")
                .with_attr("xmlns:a", DRAWING_MAIN_NS)
                .with_child(
                    XmlElement::new("a:graphicData")
                        .with_attr("uri", PICTURE_NS)
                        .with_child(pic),
                ),
        )
}
