use anyhow::Result;

use crate::annotate::Annotator;
use crate::features::{FeatureLayout, FeatureVector};
use crate::landmarks::LandmarkModel;
use crate::types::{Frame, LandmarkSet};

/// Result of one extraction step.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Mirrored frame, with landmark overlays unless annotation is off.
    pub annotated: Frame,
    pub landmarks: LandmarkSet,
    /// `None` when no face was found; classification is skipped for this frame.
    pub features: Option<FeatureVector>,
}

/// Frame in, feature vector (or "no subject") out.
pub struct LandmarkExtractor {
    model: Box<dyn LandmarkModel>,
    layout: FeatureLayout,
    annotator: Annotator,
    annotate: bool,
}

impl LandmarkExtractor {
    pub fn new(model: Box<dyn LandmarkModel>, layout: FeatureLayout, annotator: Annotator) -> Self {
        Self {
            model,
            layout,
            annotator,
            annotate: true,
        }
    }

    /// Turn overlay drawing off when nobody displays the frames.
    pub fn set_annotate(&mut self, on: bool) {
        self.annotate = on;
    }

    pub fn annotates(&self) -> bool {
        self.annotate
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn model_name(&self) -> String {
        self.model.name()
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub fn extract(&mut self, frame: &Frame) -> Result<Extraction> {
        // Mirror first so the display matches what the user sees in a mirror.
        let mut mirrored = image::imageops::flip_horizontal(frame);
        let landmarks = self.model.detect(&mirrored)?;
        if self.annotate {
            self.annotator.draw_landmarks(&mut mirrored, &landmarks);
        }
        let features = self.layout.build(&landmarks)?;

        Ok(Extraction {
            annotated: mirrored,
            landmarks,
            features,
        })
    }
}
