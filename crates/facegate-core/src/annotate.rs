//! Frame annotation: boxes colored by acceptance, with a label caption.

use crate::types::FaceRegion;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;

pub const ACCEPTED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const REJECTED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: i32 = 2;
/// Gap between the caption's bottom edge and the box top.
const CAPTION_OFFSET: i32 = 10;
const CAPTION_SCALE: f32 = 18.0;
/// Caption tab size per character when no font is loaded.
const FALLBACK_CHAR_WIDTH: u32 = 8;
const FALLBACK_CAPTION_HEIGHT: u32 = 12;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("cannot read font {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {0}")]
    InvalidFont(String),
}

/// Draws recognition results onto a copy of a frame.
///
/// Without a font, each caption is drawn as a solid tab sized to its text.
#[derive(Debug, Default)]
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Annotator that renders caption text with the TrueType/OpenType font at `path`.
    pub fn with_font_file(path: &Path) -> Result<Self, AnnotateError> {
        let bytes = std::fs::read(path).map_err(|source| AnnotateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| AnnotateError::InvalidFont(path.display().to_string()))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw one face box and its `"<label> (<score>)"` caption in place.
    pub fn draw_face(
        &self,
        canvas: &mut RgbImage,
        region: &FaceRegion,
        label: &str,
        score: f32,
        accepted: bool,
    ) {
        let color = if accepted { ACCEPTED_COLOR } else { REJECTED_COLOR };
        let x = region.x.round() as i32;
        let y = region.y.round() as i32;
        let width = region.width.round() as i32;
        let height = region.height.round() as i32;

        for inset in 0..BOX_THICKNESS {
            let w = width - 2 * inset;
            let h = height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let caption = caption(label, score);
        match &self.font {
            Some(font) => {
                let scale = PxScale::from(CAPTION_SCALE);
                let (_, text_h) = text_size(scale, font, &caption);
                let top = y - CAPTION_OFFSET - text_h as i32;
                draw_text_mut(canvas, color, x, top, scale, font, &caption);
            }
            None => {
                let tab_w = FALLBACK_CHAR_WIDTH * caption.chars().count() as u32;
                let top = y - CAPTION_OFFSET - FALLBACK_CAPTION_HEIGHT as i32;
                let rect = Rect::at(x, top).of_size(tab_w.max(1), FALLBACK_CAPTION_HEIGHT);
                draw_filled_rect_mut(canvas, rect, color);
            }
        }
    }
}

/// Caption text for one face, score to two decimals.
pub fn caption(label: &str, score: f32) -> String {
    format!("{label} ({score:.2})")
}
