// Error cases callers of the emotion pipeline need to tell apart.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmotionError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("failed to load label vocabulary: {0}")]
    Labels(String),

    #[error("feature vector length mismatch: model expects {expected}, extractor produced {actual}")]
    FeatureLength { expected: usize, actual: usize },

    #[error("model returns {scores} scores but the vocabulary has {labels} labels")]
    LabelCount { labels: usize, scores: usize },

    #[error("{group} landmarks: expected {expected} points, got {actual}")]
    LandmarkCount {
        group: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("emotion detection unavailable: {0}")]
    Unavailable(String),

    #[error("camera unavailable: {0}")]
    Camera(String),
}

pub type Result<T> = std::result::Result<T, EmotionError>;
