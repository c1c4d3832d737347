//! Webcam emotion detection: face/hand landmarks -> fixed-length feature vector -> pretrained
//! classifier -> a durable "current emotion" other tools read to build music searches.

pub mod annotate;
pub mod camera;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod features;
pub mod font;
pub mod history;
pub mod landmarks;
pub mod output;
pub mod pipeline;
pub mod prefs;
pub mod query;
pub mod state;
pub mod ttf;
pub mod types;
pub mod worker;

pub use classifier::{EmotionClassifier, EmotionLabel, LabelVocabulary, Scorer};
pub use error::EmotionError;
pub use features::{FeatureLayout, FeatureVector};
pub use pipeline::{EmotionPipeline, FrameAnalysis, Pipeline};
pub use state::{EmotionSlot, EmotionState};
pub use types::{Frame, LandmarkSet, Landmarks, Point3D};
