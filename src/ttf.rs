use image::Rgb;
use rusttype::{point, Font, Scale};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::types::Frame;

pub struct FontRenderer {
    font: Font<'static>,
}

impl FontRenderer {
    /// Look for `<family>.ttf` in the usual macOS/Linux font directories and the working dir.
    pub fn try_load(family: &str) -> Option<Self> {
        let paths = [
            format!("/Library/Fonts/{}.ttf", family),
            format!("/System/Library/Fonts/{}.ttf", family),
            format!("/System/Library/Fonts/Supplemental/{}.ttf", family),
            format!("/usr/share/fonts/truetype/{}.ttf", family),
            format!("{}.ttf", family),
        ];

        for p in paths.iter().filter(|p| Path::new(p).exists()) {
            if let Some(font) = fs::read(p).ok().and_then(Font::try_from_vec) {
                info!(path = %p, "loaded font");
                return Some(Self { font });
            }
        }

        debug!(family, "font family not found, falling back to bitmap font");
        None
    }

    pub fn draw_text(&self, frame: &mut Frame, x: u32, y: u32, text: &str, color: Rgb<u8>, size_pt: f32) {
        let scale = Scale::uniform(size_pt);
        let v_metrics = self.font.v_metrics(scale);
        let start = point(x as f32, y as f32 + v_metrics.ascent);
        let (w, h) = frame.dimensions();

        for glyph in self.font.layout(text, scale, start) {
            let Some(bb) = glyph.pixel_bounding_box() else { continue };
            glyph.draw(|gx, gy, v| {
                if v < 0.2 {
                    return;
                }
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                if px >= 0 && py >= 0 && (px as u32) < w && (py as u32) < h {
                    frame.put_pixel(px as u32, py as u32, color);
                }
            });
        }
    }

    pub fn measure_height(&self, size_pt: f32) -> u32 {
        let v_metrics = self.font.v_metrics(Scale::uniform(size_pt));
        (v_metrics.ascent - v_metrics.descent + v_metrics.line_gap).max(0.0) as u32
    }
}
