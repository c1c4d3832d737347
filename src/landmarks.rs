//! Landmark backends. Every backend reports points in normalized coordinates of the frame it
//! was handed (x right, y down, both 0..1).

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use tracing::{info, warn};

use crate::config::{DetectionConfig, ModelConfig};
use crate::detector::FaceDetector;
use crate::error::EmotionError;
use crate::types::{Frame, LandmarkSet, Landmarks, Point3D, Rect};

pub const FACE_MESH_POINTS: usize = 468;
pub const HAND_POINTS: usize = 21;

const MESH_INPUT: u32 = 192;
const HAND_INPUT: u32 = 224;

/// Produces a [`LandmarkSet`] for one (already mirrored) frame.
pub trait LandmarkModel: Send {
    fn name(&self) -> String;
    fn detect(&mut self, frame: &Frame) -> Result<LandmarkSet>;
}

fn build_session(model_path: &str, intra_threads: usize) -> Result<Session> {
    if !Path::new(model_path).exists() {
        return Err(EmotionError::ModelLoad(format!("{model_path} not found")).into());
    }
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers([
            ort::execution_providers::CoreMLExecutionProvider::default().build(),
            ort::execution_providers::CPUExecutionProvider::default().build(),
        ])?
        .commit_from_file(model_path)
        .with_context(|| format!("loading {model_path}"))?;
    Ok(session)
}

/// Hand slot in the feature vector.
///
/// Slots follow the holistic-landmark convention the classifier was trained with: handedness is
/// assigned as if the image were not mirrored. On the mirrored frame the `Left` slot is therefore
/// filled from the right half of the image and the `Right` slot from the left half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    /// `(x0, width)` of the image columns searched for this hand.
    pub fn columns(self, frame_width: u32) -> (u32, u32) {
        let half = frame_width / 2;
        match self {
            HandSide::Left => (half, frame_width - half),
            HandSide::Right => (0, half),
        }
    }
}

/// Face detector + 468-point face mesh, plus an optional 21-point hand model.
pub struct OnnxHolisticModel {
    detector: FaceDetector,
    mesh: Session,
    hands: Option<Session>,
    hand_presence_threshold: f32,
}

impl OnnxHolisticModel {
    pub fn new(models: &ModelConfig, detection: &DetectionConfig) -> Result<Self> {
        if !Path::new(&models.face_detection_path).exists() {
            return Err(EmotionError::ModelLoad(format!("{} not found", models.face_detection_path)).into());
        }
        info!(path = %models.face_detection_path, "loading face detector");
        let detector = FaceDetector::new(
            &models.face_detection_path,
            detection.face_score_threshold,
            models.intra_threads,
        )?;

        info!(path = %models.face_mesh_path, "loading face mesh");
        let mesh = build_session(&models.face_mesh_path, models.intra_threads)?;

        let hands = match models.hand_landmark_path.as_deref() {
            Some(path) if Path::new(path).exists() => {
                info!(path, "loading hand landmark model");
                Some(build_session(path, models.intra_threads)?)
            }
            Some(path) => {
                warn!(path, "hand landmark model not found, hands will always read as absent");
                None
            }
            None => None,
        };

        Ok(Self {
            detector,
            mesh,
            hands,
            hand_presence_threshold: detection.hand_presence_threshold,
        })
    }

    fn face_mesh(&mut self, frame: &Frame, roi: Rect) -> Result<Option<Landmarks>> {
        let roi = roi.padded(0.25, frame.width(), frame.height());
        if roi.width < 1.0 || roi.height < 1.0 {
            return Ok(None);
        }
        let crop = image::imageops::crop_imm(frame, roi.x as u32, roi.y as u32, roi.width as u32, roi.height as u32)
            .to_image();
        let input = nhwc_tensor(&crop, MESH_INPUT, |v| v / 127.5 - 1.0)?;
        let outputs = self.mesh.run(ort::inputs![input])?;
        let (_, raw) = outputs[0].try_extract_tensor::<f32>()?;

        if raw.len() < FACE_MESH_POINTS * 3 {
            return Ok(None);
        }
        let scale_x = roi.width / MESH_INPUT as f32;
        let scale_y = roi.height / MESH_INPUT as f32;
        let (fw, fh) = (frame.width() as f32, frame.height() as f32);

        // mesh input pixels -> crop -> full frame -> normalized
        let points = raw
            .chunks_exact(3)
            .take(FACE_MESH_POINTS)
            .map(|p| Point3D::new((roi.x + p[0] * scale_x) / fw, (roi.y + p[1] * scale_y) / fh, p[2] / MESH_INPUT as f32))
            .collect();
        Ok(Some(Landmarks::new(points)))
    }

    /// Runs the hand model over the half of the (mirrored) frame that holds `side`.
    fn hand(&mut self, frame: &Frame, side: HandSide) -> Result<Option<Landmarks>> {
        let threshold = self.hand_presence_threshold;
        let Some(session) = self.hands.as_mut() else {
            return Ok(None);
        };

        let (x0, w) = side.columns(frame.width());
        if w == 0 || frame.height() == 0 {
            return Ok(None);
        }
        let region = Rect::new(x0 as f32, 0.0, w as f32, frame.height() as f32);
        let crop = image::imageops::crop_imm(frame, x0, 0, w, frame.height()).to_image();

        let input = nhwc_tensor(&crop, HAND_INPUT, |v| v / 255.0)?;
        let outputs = session.run(ort::inputs![input])?;

        let mut coords: Option<Vec<f32>> = None;
        let mut presence: Option<f32> = None;
        for (_name, value) in outputs.iter() {
            let (_, data) = value.try_extract_tensor::<f32>()?;
            if data.len() >= HAND_POINTS * 3 && coords.is_none() {
                coords = Some(data.to_vec());
            } else if data.len() == 1 && presence.is_none() {
                presence = Some(data[0]);
            }
        }
        let coords = coords.ok_or_else(|| anyhow!("hand model produced no landmark output"))?;
        if presence.unwrap_or(0.0) < threshold {
            return Ok(None);
        }

        let scale_x = region.width / HAND_INPUT as f32;
        let scale_y = region.height / HAND_INPUT as f32;
        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let points = coords
            .chunks_exact(3)
            .take(HAND_POINTS)
            .map(|p| Point3D::new((region.x + p[0] * scale_x) / fw, (region.y + p[1] * scale_y) / fh, p[2] / HAND_INPUT as f32))
            .collect();
        Ok(Some(Landmarks::new(points)))
    }
}

impl LandmarkModel for OnnxHolisticModel {
    fn name(&self) -> String {
        if self.hands.is_some() {
            "Face Mesh (468 pts) + Hands (21 pts)".to_string()
        } else {
            "Face Mesh (468 pts)".to_string()
        }
    }

    fn detect(&mut self, frame: &Frame) -> Result<LandmarkSet> {
        let Some(roi) = self.detector.detect(frame)? else {
            return Ok(LandmarkSet::empty());
        };
        let Some(face) = self.face_mesh(frame, roi)? else {
            return Ok(LandmarkSet::empty());
        };

        Ok(LandmarkSet {
            face: Some(face),
            left_hand: self.hand(frame, HandSide::Left)?,
            right_hand: self.hand(frame, HandSide::Right)?,
        })
    }
}

/// Resize to `size`x`size` and pack as [1, size, size, 3] with `norm` applied per channel.
fn nhwc_tensor(image: &Frame, size: u32, norm: impl Fn(f32) -> f32) -> Result<Tensor<f32>> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let data: Vec<f32> = resized.as_raw().iter().map(|&v| norm(v as f32)).collect();
    Ok(Tensor::from_array((vec![1, size as usize, size as usize, 3], data))?)
}
