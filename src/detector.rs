use anyhow::{Context, Result};
use image::imageops::FilterType;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::debug;

use crate::types::{Frame, Rect};

const INPUT_W: u32 = 320;
const INPUT_H: u32 = 240;
const CENTER_VARIANCE: f32 = 0.1;
const SIZE_VARIANCE: f32 = 0.2;

/// UltraFace-style single face locator. Only the best-scoring box is kept: one user per session.
pub struct FaceDetector {
    session: Session,
    anchors: Vec<(f32, f32, f32, f32)>, // cx, cy, w, h
    score_threshold: f32,
}

impl FaceDetector {
    pub fn new(model_path: &str, score_threshold: f32, intra_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers([
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])?
            .commit_from_file(model_path)
            .with_context(|| format!("loading face detector {model_path}"))?;

        Ok(Self {
            session,
            anchors: generate_anchors(INPUT_W as usize, INPUT_H as usize),
            score_threshold,
        })
    }

    /// Best face box in frame pixel coordinates, if any clears the threshold.
    pub fn detect(&mut self, frame: &Frame) -> Result<Option<Rect>> {
        let resized = image::imageops::resize(frame, INPUT_W, INPUT_H, FilterType::Triangle);

        // NCHW, (pixel - 127) / 128
        let plane = (INPUT_W * INPUT_H) as usize;
        let mut input_data = vec![0.0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                input_data[c * plane + i] = (pixel[c] as f32 - 127.0) / 128.0;
            }
        }

        let input = Tensor::from_array((vec![1, 3, INPUT_H as usize, INPUT_W as usize], input_data))?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (_, scores) = outputs["scores"].try_extract_tensor::<f32>()?;
        let (_, boxes) = outputs["boxes"].try_extract_tensor::<f32>()?;

        let Some(rect) = decode_best(&self.anchors, scores, boxes, self.score_threshold) else {
            return Ok(None);
        };
        debug!(?rect, "face located");

        let sx = frame.width() as f32 / INPUT_W as f32;
        let sy = frame.height() as f32 / INPUT_H as f32;
        Ok(Some(Rect::new(rect.x * sx, rect.y * sy, rect.width * sx, rect.height * sy)))
    }
}

/// Decode the highest-scoring anchor above `threshold` into detector-input pixels.
fn decode_best(
    anchors: &[(f32, f32, f32, f32)],
    scores: &[f32],
    boxes: &[f32],
    threshold: f32,
) -> Option<Rect> {
    let mut best_score = threshold;
    let mut best = None;

    for (i, &(ax, ay, aw, ah)) in anchors.iter().enumerate() {
        let Some(&score) = scores.get(i * 2 + 1) else { break };
        if score <= best_score {
            continue;
        }
        let Some(enc) = boxes.get(i * 4..i * 4 + 4) else { break };

        let cx = enc[0] * CENTER_VARIANCE * aw + ax;
        let cy = enc[1] * CENTER_VARIANCE * ah + ay;
        let w = (enc[2] * SIZE_VARIANCE).exp() * aw;
        let h = (enc[3] * SIZE_VARIANCE).exp() * ah;

        best_score = score;
        best = Some(Rect::new(
            (cx - w / 2.0) * INPUT_W as f32,
            (cy - h / 2.0) * INPUT_H as f32,
            w * INPUT_W as f32,
            h * INPUT_H as f32,
        ));
    }
    best
}

fn generate_anchors(width: usize, height: usize) -> Vec<(f32, f32, f32, f32)> {
    let shrinkage_list = [8usize, 16, 32, 64];
    let min_boxes: [&[f32]; 4] = [&[10.0, 16.0, 24.0], &[32.0, 48.0], &[64.0, 96.0], &[128.0, 192.0, 256.0]];

    let w = width as f32;
    let h = height as f32;
    let mut anchors = Vec::new();

    for (shrinkage, boxes) in shrinkage_list.iter().zip(min_boxes) {
        let s = *shrinkage as f32;
        let feature_h = (h / s).ceil() as usize;
        let feature_w = (w / s).ceil() as usize;

        for v in 0..feature_h {
            for u in 0..feature_w {
                let cx = (u as f32 * s + s / 2.0) / w;
                let cy = (v as f32 * s + s / 2.0) / h;
                for &min_box in boxes {
                    anchors.push((cx, cy, min_box / w, min_box / h));
                }
            }
        }
    }
    anchors
}
