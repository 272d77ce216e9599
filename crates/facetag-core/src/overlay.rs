//! Detection overlays: boxes and labels burned into a copy of the image.
//!
//! Drawing goes through `imageproc` on an `image::RgbImage` surface; the
//! input tensor is converted to that surface and back, never modified.

use crate::tensor::ImageTensor;
use crate::types::{Detection, MatchResult};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([220, 30, 30]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LINE_WIDTH: u32 = 2;
const LABEL_PADDING: u32 = 2;
const DEFAULT_TEXT_SCALE: f32 = 18.0;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("{matches} matches but {detections} detections")]
    LengthMismatch { matches: usize, detections: usize },
    #[error("cannot read font {path}: {source}")]
    FontIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font file {0}")]
    InvalidFont(String),
}

/// Draws one box and one label per match.
pub struct OverlayRenderer {
    font: Option<FontVec>,
    text_scale: f32,
}

impl OverlayRenderer {
    /// Boxes only; labels need a font.
    pub fn new() -> Self {
        Self {
            font: None,
            text_scale: DEFAULT_TEXT_SCALE,
        }
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn with_font_file(path: &Path) -> Result<Self, OverlayError> {
        let bytes = std::fs::read(path).map_err(|source| OverlayError::FontIo {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| OverlayError::InvalidFont(path.display().to_string()))?;

        tracing::debug!(path = %path.display(), "overlay font loaded");
        Ok(Self {
            font: Some(font),
            text_scale: DEFAULT_TEXT_SCALE,
        })
    }

    pub fn with_text_scale(mut self, text_scale: f32) -> Self {
        self.text_scale = text_scale;
        self
    }

    /// Return a copy of `image` with each detection's box and its match label drawn.
    ///
    /// `matches[i]` belongs to `detections[i]`.
    pub fn render(
        &self,
        image: &ImageTensor,
        matches: &[MatchResult],
        detections: &[Detection],
    ) -> Result<ImageTensor, OverlayError> {
        if matches.len() != detections.len() {
            return Err(OverlayError::LengthMismatch {
                matches: matches.len(),
                detections: detections.len(),
            });
        }

        if self.font.is_none() && !matches.is_empty() {
            tracing::warn!("no overlay font configured; drawing boxes without labels");
        }

        let mut canvas = image.to_rgb();
        for (result, detection) in matches.iter().zip(detections) {
            let color = if result.is_known() { KNOWN_COLOR } else { UNKNOWN_COLOR };
            let bbox = &detection.bbox;
            let (x, y) = (bbox.x.round() as i32, bbox.y.round() as i32);
            let (w, h) = (bbox.width.round().max(1.0) as u32, bbox.height.round().max(1.0) as u32);

            draw_box(&mut canvas, x, y, w, h, color);

            if let Some(font) = &self.font {
                let text = format!("{} ({:.2})", result.label, result.distance);
                self.draw_label(&mut canvas, font, &text, x, y, color);
            }
        }

        Ok(ImageTensor::from_rgb(&canvas))
    }

    /// Filled label background sitting on top of the box, clamped to the image.
    fn draw_label(&self, canvas: &mut RgbImage, font: &FontVec, text: &str, x: i32, y: i32, bg: Rgb<u8>) {
        let scale = PxScale::from(self.text_scale);
        let (text_w, text_h) = text_size(scale, font, text);
        let box_w = text_w + 2 * LABEL_PADDING;
        let box_h = text_h + 2 * LABEL_PADDING;
        let top = (y - box_h as i32).max(0);
        let left = x.max(0);

        draw_filled_rect_mut(canvas, Rect::at(left, top).of_size(box_w.max(1), box_h.max(1)), bg);
        draw_text_mut(
            canvas,
            TEXT_COLOR,
            left + LABEL_PADDING as i32,
            top + LABEL_PADDING as i32,
            scale,
            font,
            text,
        );
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Hollow rectangle `LINE_WIDTH` pixels thick, growing inward.
fn draw_box(canvas: &mut RgbImage, x: i32, y: i32, w: u32, h: u32, color: Rgb<u8>) {
    for inset in 0..LINE_WIDTH {
        if w <= 2 * inset || h <= 2 * inset {
            break;
        }
        let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(w - 2 * inset, h - 2 * inset);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
