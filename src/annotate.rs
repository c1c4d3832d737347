//! Display overlay: landmark dots, hand skeletons and the detected label.
//! Purely cosmetic; nothing here feeds back into classification.

use image::Rgb;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::classifier::EmotionLabel;
use crate::config::{Defaults, UiConfig};
use crate::font;
use crate::ttf::FontRenderer;
use crate::types::{Frame, LandmarkSet, Landmarks};

/// MediaPipe hand topology.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1), (1, 2), (2, 3), (3, 4),
    (0, 5), (5, 6), (6, 7), (7, 8),
    (5, 9), (9, 10), (10, 11), (11, 12),
    (9, 13), (13, 14), (14, 15), (15, 16),
    (13, 17), (0, 17), (17, 18), (18, 19), (19, 20),
];

const LABEL_ORIGIN: (u32, u32) = (50, 50);

#[derive(Debug, Clone)]
pub struct AnnotationStyle {
    pub show_mesh: bool,
    pub show_hands: bool,
    pub show_label: bool,
    pub dot_size: u32,
    pub mesh_color: Rgb<u8>,
    pub hand_color: Rgb<u8>,
    pub label_color: Rgb<u8>,
    pub font_size_pt: f32,
    pub bitmap_scale: u32,
}

impl AnnotationStyle {
    pub fn from_config(defaults: &Defaults, ui: &UiConfig) -> Self {
        Self {
            show_mesh: defaults.show_mesh,
            show_hands: defaults.show_hands,
            show_label: defaults.show_label,
            dot_size: ui.mesh_dot_size.max(1),
            mesh_color: parse_hex(&ui.mesh_color_hex),
            hand_color: parse_hex(&ui.hand_color_hex),
            label_color: parse_hex(&ui.label_color_hex),
            font_size_pt: ui.font_size_pt as f32,
            bitmap_scale: (ui.menu_scale * 2).max(1) as u32,
        }
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self::from_config(&Defaults::default(), &UiConfig::default())
    }
}

/// Overlay style shared between the annotator and whoever toggles it (e.g. the display loop).
pub type SharedStyle = Arc<RwLock<AnnotationStyle>>;

pub struct Annotator {
    style: SharedStyle,
    font: Option<FontRenderer>,
}

impl Annotator {
    pub fn new(style: AnnotationStyle, font: Option<FontRenderer>) -> Self {
        Self {
            style: Arc::new(RwLock::new(style)),
            font,
        }
    }

    /// Snapshot of the current style.
    pub fn style(&self) -> AnnotationStyle {
        self.style.read().clone()
    }

    /// Handle for changing the style from another thread; changes apply to the next draw.
    pub fn shared_style(&self) -> SharedStyle {
        Arc::clone(&self.style)
    }

    pub fn draw_landmarks(&self, frame: &mut Frame, set: &LandmarkSet) {
        let style = self.style.read();
        if style.show_mesh {
            if let Some(face) = &set.face {
                for p in &face.points {
                    draw_dot(frame, p.x, p.y, style.dot_size, style.mesh_color);
                }
            }
        }
        if style.show_hands {
            for hand in [&set.left_hand, &set.right_hand].into_iter().flatten() {
                draw_hand(frame, hand, style.hand_color);
            }
        }
    }

    pub fn draw_label(&self, frame: &mut Frame, label: &EmotionLabel) {
        let style = self.style.read();
        if !style.show_label {
            return;
        }
        let (x, y) = LABEL_ORIGIN;
        match &self.font {
            Some(font) => font.draw_text(frame, x, y, label.as_str(), style.label_color, style.font_size_pt),
            None => font::draw_text_line(frame, x, y, label.as_str(), style.label_color, style.bitmap_scale),
        }
    }
}

fn draw_hand(frame: &mut Frame, hand: &Landmarks, color: Rgb<u8>) {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    for &(a, b) in HAND_CONNECTIONS.iter() {
        if let (Some(pa), Some(pb)) = (hand.points.get(a), hand.points.get(b)) {
            draw_line(frame, (pa.x * w, pa.y * h), (pb.x * w, pb.y * h), color);
        }
    }
    for p in &hand.points {
        draw_dot(frame, p.x, p.y, 3, color);
    }
}

/// Square dot at normalized (nx, ny).
fn draw_dot(frame: &mut Frame, nx: f32, ny: f32, size: u32, color: Rgb<u8>) {
    let (w, h) = frame.dimensions();
    if !(0.0..1.0).contains(&nx) || !(0.0..1.0).contains(&ny) {
        return;
    }
    let x = (nx * w as f32) as u32;
    let y = (ny * h as f32) as u32;
    for dy in 0..size {
        for dx in 0..size {
            if x + dx < w && y + dy < h {
                frame.put_pixel(x + dx, y + dy, color);
            }
        }
    }
}

fn draw_line(frame: &mut Frame, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let px = (from.0 + (to.0 - from.0) * t) as i64;
        let py = (from.1 + (to.1 - from.1) * t) as i64;
        if px >= 0 && px < w && py >= 0 && py < h {
            frame.put_pixel(px as u32, py as u32, color);
        }
    }
}

/// `#RRGGBB` to RGB, red when malformed.
pub fn parse_hex(hex: &str) -> Rgb<u8> {
    if hex.len() == 7 && hex.is_ascii() && hex.starts_with('#') {
        let r = u8::from_str_radix(&hex[1..3], 16).unwrap_or(255);
        let g = u8::from_str_radix(&hex[3..5], 16).unwrap_or(0);
        let b = u8::from_str_radix(&hex[5..7], 16).unwrap_or(0);
        Rgb([r, g, b])
    } else {
        Rgb([255, 0, 0])
    }
}
