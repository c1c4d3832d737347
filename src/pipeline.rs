use anyhow::Result;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::annotate::{AnnotationStyle, Annotator, SharedStyle};
use crate::classifier::{Classification, EmotionClassifier, LabelVocabulary, OnnxScorer};
use crate::config::AppConfig;
use crate::error::EmotionError;
use crate::extractor::LandmarkExtractor;
use crate::features::FeatureLayout;
use crate::history::{HistoryLog, HistoryRecorder, SessionContext};
use crate::landmarks::{LandmarkModel, OnnxHolisticModel};
use crate::state::EmotionState;
use crate::ttf::FontRenderer;
use crate::types::{Frame, LandmarkSet};

pub trait Pipeline {
    fn name(&self) -> String;
    fn process(&mut self, frame: &Frame) -> Result<FrameAnalysis>;
}

/// What one frame produced. The annotated frame is always there, the emotion only when a
/// face was found and classified.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub annotated: Frame,
    pub landmarks: LandmarkSet,
    pub emotion: Option<Classification>,
}

/// Extract -> classify -> update the current emotion, once per delivered frame.
pub struct EmotionPipeline {
    extractor: LandmarkExtractor,
    classifier: EmotionClassifier,
    state: EmotionState,
    history: Option<HistoryRecorder>,
    disabled: Option<String>,
}

impl EmotionPipeline {
    pub fn new(extractor: LandmarkExtractor, classifier: EmotionClassifier, state: EmotionState) -> Self {
        Self {
            extractor,
            classifier,
            state,
            history: None,
            disabled: None,
        }
    }

    /// Load every model named in `config`. Any failure means the pipeline can't run at all.
    pub fn from_config(
        config: &AppConfig,
        state: EmotionState,
        session: SessionContext,
    ) -> std::result::Result<Self, EmotionError> {
        let layout = config.features;
        layout.validate()?;

        let labels =
            LabelVocabulary::load_or_default(&config.models.labels_path, config.models.allow_default_labels)?;
        let models = &config.models;
        for path in [&models.face_detection_path, &models.face_mesh_path, &models.emotion_model_path] {
            if !Path::new(path).exists() {
                return Err(EmotionError::ModelLoad(format!("{path} not found")));
            }
        }

        let scorer = OnnxScorer::new(&models.emotion_model_path, models.intra_threads).map_err(model_load)?;
        let model = OnnxHolisticModel::new(models, &config.detection).map_err(model_load)?;
        let classifier = EmotionClassifier::new(Box::new(scorer), labels, layout.len())?
            .with_min_confidence(config.detection.min_confidence);
        if let Some(t) = config.detection.min_confidence {
            warn!(threshold = t, "confidence gate enabled, low-confidence frames will not update the emotion");
        }

        let annotator = Annotator::new(
            AnnotationStyle::from_config(&config.defaults, &config.ui),
            FontRenderer::try_load(&config.ui.font_family),
        );
        let extractor = LandmarkExtractor::new(Box::new(model), layout, annotator);

        let mut pipeline = Self::new(extractor, classifier, state);
        if config.storage.record_history {
            pipeline = pipeline.with_history(HistoryRecorder::new(
                Box::new(HistoryLog::new(&config.storage.history_path)),
                session,
                config.storage.dedupe_history,
            ));
        }
        info!(pipeline = %pipeline.name(), features = layout.len(), "emotion pipeline ready");
        Ok(pipeline)
    }

    /// Assemble from an already-loaded landmark model.
    pub fn with_model(
        model: Box<dyn LandmarkModel>,
        layout: FeatureLayout,
        classifier: EmotionClassifier,
        state: EmotionState,
    ) -> Self {
        let extractor = LandmarkExtractor::new(model, layout, Annotator::new(AnnotationStyle::default(), None));
        Self::new(extractor, classifier, state)
    }

    /// Skip overlay drawing for headless runs; the annotated frame is then just the mirror.
    pub fn with_annotation(mut self, on: bool) -> Self {
        self.extractor.set_annotate(on);
        self
    }

    /// Overlay toggles, shared with the display loop.
    pub fn annotation_style(&self) -> SharedStyle {
        self.extractor.annotator().shared_style()
    }

    pub fn with_history(mut self, recorder: HistoryRecorder) -> Self {
        self.history = Some(recorder);
        self
    }

    pub fn state(&self) -> &EmotionState {
        &self.state
    }

    /// Why the pipeline stopped, once a fatal mismatch was seen.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled.as_deref()
    }

    /// Run one frame through extraction and classification without touching shared state.
    pub fn analyze(&mut self, frame: &Frame) -> Result<FrameAnalysis> {
        if let Some(reason) = &self.disabled {
            return Err(EmotionError::Unavailable(reason.clone()).into());
        }

        let extraction = self.extractor.extract(frame).map_err(|e| self.disable_on_skew(e))?;
        let mut annotated = extraction.annotated;

        let emotion = match &extraction.features {
            Some(features) => self
                .classifier
                .classify(features)
                .map_err(|e| self.disable_on_skew(e))?,
            None => None,
        };
        if let Some(c) = emotion.as_ref().filter(|_| self.extractor.annotates()) {
            self.extractor.annotator().draw_label(&mut annotated, &c.label);
        }

        Ok(FrameAnalysis {
            annotated,
            landmarks: extraction.landmarks,
            emotion,
        })
    }

    /// Model/extractor version skew can't fix itself; stop classifying for good.
    fn disable_on_skew(&mut self, err: anyhow::Error) -> anyhow::Error {
        match err.downcast_ref::<EmotionError>() {
            Some(skew @ (EmotionError::FeatureLength { .. } | EmotionError::LandmarkCount { .. })) => {
                let reason = skew.to_string();
                error!(%reason, "disabling emotion detection");
                self.disabled = Some(reason.clone());
                EmotionError::Unavailable(reason).into()
            }
            _ => err,
        }
    }
}

impl Pipeline for EmotionPipeline {
    fn name(&self) -> String {
        format!(
            "Emotion ({}, {} features, {} labels)",
            self.extractor.model_name(),
            self.extractor.layout().len(),
            self.classifier.labels().len()
        )
    }

    fn process(&mut self, frame: &Frame) -> Result<FrameAnalysis> {
        let analysis = self.analyze(frame)?;

        if let Some(c) = &analysis.emotion {
            debug!(label = %c.label, score = c.score, "frame classified");
            if let Err(e) = self.state.update(&c.label) {
                warn!(error = %e, "failed to store current emotion");
            }
            if let Some(history) = self.history.as_mut() {
                if let Err(e) = history.observe(&c.label) {
                    warn!(error = %e, "failed to record history event");
                }
            }
        }
        Ok(analysis)
    }
}

fn model_load(e: anyhow::Error) -> EmotionError {
    match e.downcast::<EmotionError>() {
        Ok(err) => err,
        Err(e) => EmotionError::ModelLoad(format!("{e:#}")),
    }
}
