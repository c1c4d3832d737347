use anyhow::{anyhow, Result};
use image::{ImageBuffer, Rgb};

/// One camera frame, RGB channel order.
pub type Frame = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Represents a single 3D point
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// An ordered group of landmarks in normalized image coordinates (0..1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landmarks {
    pub points: Vec<Point3D>,
}

impl Landmarks {
    pub fn new(points: Vec<Point3D>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Same landmarks shifted by (dx, dy).
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| Point3D::new(p.x + dx, p.y + dy, p.z))
                .collect(),
        }
    }
}

/// Everything one frame's landmark pass found. Any group may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    pub face: Option<Landmarks>,
    pub left_hand: Option<Landmarks>,
    pub right_hand: Option<Landmarks>,
}

impl LandmarkSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_face(&self) -> bool {
        self.face.as_ref().is_some_and(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Grow by `ratio` of the size (split evenly on both sides) and clip to the frame.
    pub fn padded(&self, ratio: f32, frame_w: u32, frame_h: u32) -> Self {
        let pad_w = self.width * ratio;
        let pad_h = self.height * ratio;
        let x = (self.x - pad_w / 2.0).max(0.0);
        let y = (self.y - pad_h / 2.0).max(0.0);
        let w = (self.width + pad_w).min(frame_w as f32 - x);
        let h = (self.height + pad_h).min(frame_h as f32 - y);
        Self::new(x, y, w.max(0.0), h.max(0.0))
    }
}

/// Build a frame from a packed BGR24 buffer (the layout most webcam/media stacks hand out).
pub fn frame_from_bgr(width: u32, height: u32, bgr: &[u8]) -> Result<Frame> {
    let expected = width as usize * height as usize * 3;
    if bgr.len() != expected {
        return Err(anyhow!(
            "BGR buffer has {} bytes, expected {} for {}x{}",
            bgr.len(),
            expected,
            width,
            height
        ));
    }
    let mut rgb = Vec::with_capacity(expected);
    for px in bgr.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    ImageBuffer::from_raw(width, height, rgb).ok_or_else(|| anyhow!("invalid frame dimensions"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_channels_are_swapped() {
        let frame = frame_from_bgr(2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(frame.get_pixel(1, 0).0, [6, 5, 4]);
    }

    #[test]
    fn bgr_length_mismatch_is_rejected() {
        assert!(frame_from_bgr(2, 2, &[0; 5]).is_err());
    }

    #[test]
    fn padded_rect_stays_inside_frame() {
        let r = Rect::new(5.0, 5.0, 100.0, 100.0).padded(0.25, 100, 100);
        assert_eq!(r.x, 0.0);
        assert_eq!(r.y, 0.0);
        assert!(r.x + r.width <= 100.0);
        assert!(r.y + r.height <= 100.0);
    }

    #[test]
    fn empty_face_group_is_not_a_face() {
        let set = LandmarkSet {
            face: Some(Landmarks::default()),
            ..LandmarkSet::default()
        };
        assert!(!set.has_face());
    }
}
