//! Emotion classifier adapter: feature vector in, one label out.

use anyhow::{anyhow, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{Tensor, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::EmotionError;
use crate::features::FeatureVector;

/// Seven-class FER label order, used only when no vocabulary file is available and fallback is allowed.
pub const DEFAULT_LABELS: [&str; 7] = ["angry", "disgust", "fear", "happy", "neutral", "sad", "surprise"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionLabel(String);

impl EmotionLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmotionLabel {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Ordered class index -> label mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVocabulary {
    labels: Vec<EmotionLabel>,
}

impl LabelVocabulary {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(EmotionLabel::new).collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(DEFAULT_LABELS)
    }

    /// Load from `.json` (string array), `.npy` (1-D unicode/bytes array) or text (one per line).
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, EmotionError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| EmotionError::Labels(format!("{}: {}", path.display(), e)))?;

        let labels = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_slice::<Vec<String>>(&bytes)
                .map_err(|e| EmotionError::Labels(format!("{}: {}", path.display(), e)))?,
            Some("npy") => parse_npy_strings(&bytes)
                .map_err(|e| EmotionError::Labels(format!("{}: {}", path.display(), e)))?,
            _ => String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        };

        if labels.is_empty() {
            return Err(EmotionError::Labels(format!("{} contains no labels", path.display())));
        }
        info!(path = %path.display(), count = labels.len(), "loaded label vocabulary");
        Ok(Self::new(labels))
    }

    /// Like [`load`](Self::load), but falls back to [`DEFAULT_LABELS`] when `allow_default` is set.
    pub fn load_or_default(
        path: impl AsRef<Path>,
        allow_default: bool,
    ) -> std::result::Result<Self, EmotionError> {
        match Self::load(path) {
            Ok(v) => Ok(v),
            Err(e) if allow_default => {
                warn!(error = %e, "using built-in emotion labels");
                Ok(Self::builtin())
            }
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, index: usize) -> Option<&EmotionLabel> {
        self.labels.get(index)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmotionLabel> {
        self.labels.iter()
    }
}

/// Minimal reader for the NumPy `.npy` files a training script writes with `np.save(labels)`.
fn parse_npy_strings(bytes: &[u8]) -> Result<Vec<String>> {
    const MAGIC: &[u8] = b"\x93NUMPY";
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(anyhow!("not an npy file"));
    }
    let major = bytes[6];
    let (header_len, header_start) = if major == 1 {
        (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10)
    } else {
        if bytes.len() < 12 {
            return Err(anyhow!("truncated npy header"));
        }
        (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| anyhow!("truncated npy header"))?;
    let header = std::str::from_utf8(header).context("npy header is not ascii")?;

    let descr = header_field(header, "descr")
        .and_then(|v| v.trim_start().strip_prefix('\''))
        .and_then(|v| v.split('\'').next())
        .ok_or_else(|| anyhow!("npy header missing descr"))?;
    let count = header_field(header, "shape")
        .and_then(|v| v.split(['(', ')']).nth(1))
        .and_then(|dims| dims.split(',').map(str::trim).find(|d| !d.is_empty()))
        .ok_or_else(|| anyhow!("npy header missing shape"))?
        .parse::<usize>()
        .context("npy shape is not a 1-D length")?;

    if descr.len() < 3 || !descr.is_ascii() {
        return Err(anyhow!("unsupported dtype {descr}"));
    }
    let (kind, width) = descr.split_at(2);
    let width: usize = width.parse().with_context(|| format!("unsupported dtype {descr}"))?;
    if width == 0 {
        return Err(anyhow!("zero-width string dtype {descr}"));
    }
    let item_size = match kind {
        "<U" => width.checked_mul(4),
        "|S" => Some(width),
        _ => return Err(anyhow!("unsupported dtype {descr}")),
    }
    .ok_or_else(|| anyhow!("unsupported dtype {descr}"))?;

    let data = &bytes[data_start..];
    let needed = count
        .checked_mul(item_size)
        .ok_or_else(|| anyhow!("npy shape {count} too large"))?;
    if data.len() < needed {
        return Err(anyhow!("npy data truncated"));
    }

    let mut out = Vec::with_capacity(count);
    for item in data.chunks_exact(item_size).take(count) {
        let s = if kind == "<U" {
            item.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .take_while(|&c| c != 0)
                .filter_map(char::from_u32)
                .collect()
        } else {
            item.iter()
                .take_while(|&&b| b != 0)
                .map(|&b| b as char)
                .collect()
        };
        out.push(s);
    }
    Ok(out)
}

fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{key}':");
    header.find(&pattern).map(|i| &header[i + pattern.len()..])
}

/// A model producing one score per class for a feature vector.
pub trait Scorer: Send {
    fn scores(&mut self, features: &[f32]) -> Result<Vec<f32>>;

    /// Input length the model declares, if it has a static one.
    fn input_len(&self) -> Option<usize> {
        None
    }
}

pub struct OnnxScorer {
    session: Session,
    input_len: Option<usize>,
}

impl OnnxScorer {
    pub fn new(model_path: &str, intra_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers([
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])?
            .commit_from_file(model_path)
            .with_context(|| format!("loading emotion model {model_path}"))?;

        let input_len = session.inputs.first().and_then(|input| match &input.input_type {
            ValueType::Tensor { shape, .. } => shape.last().copied().filter(|d| *d > 0).map(|d| d as usize),
            _ => None,
        });
        info!(model = model_path, ?input_len, "loaded emotion model");

        Ok(Self { session, input_len })
    }
}

impl Scorer for OnnxScorer {
    fn scores(&mut self, features: &[f32]) -> Result<Vec<f32>> {
        let input = Tensor::from_array((vec![1, features.len()], features.to_vec()))?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }

    fn input_len(&self) -> Option<usize> {
        self.input_len
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: EmotionLabel,
    pub score: f32,
}

pub struct EmotionClassifier {
    scorer: Box<dyn Scorer>,
    labels: LabelVocabulary,
    input_len: usize,
    min_confidence: Option<f32>,
}

impl EmotionClassifier {
    /// Wire a scorer to its vocabulary and run the startup self-check.
    pub fn new(
        scorer: Box<dyn Scorer>,
        labels: LabelVocabulary,
        input_len: usize,
    ) -> std::result::Result<Self, EmotionError> {
        let mut classifier = Self {
            scorer,
            labels,
            input_len,
            min_confidence: None,
        };
        classifier.self_check()?;
        Ok(classifier)
    }

    /// Reject frames whose top score is below `threshold`. Off unless configured.
    pub fn with_min_confidence(mut self, threshold: Option<f32>) -> Self {
        self.min_confidence = threshold;
        self
    }

    pub fn labels(&self) -> &LabelVocabulary {
        &self.labels
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    fn self_check(&mut self) -> std::result::Result<(), EmotionError> {
        if let Some(declared) = self.scorer.input_len() {
            if declared != self.input_len {
                return Err(EmotionError::FeatureLength {
                    expected: declared,
                    actual: self.input_len,
                });
            }
        }

        let zeros = vec![0.0; self.input_len];
        let scores = self
            .scorer
            .scores(&zeros)
            .map_err(|e| EmotionError::ModelLoad(format!("self-check inference failed: {e:#}")))?;
        if scores.len() != self.labels.len() {
            return Err(EmotionError::LabelCount {
                labels: self.labels.len(),
                scores: scores.len(),
            });
        }
        debug!(input_len = self.input_len, classes = scores.len(), "classifier self-check passed");
        Ok(())
    }

    /// Arg-max label for one vector. `Ok(None)` only when the confidence gate rejects it.
    pub fn classify(&mut self, features: &FeatureVector) -> Result<Option<Classification>> {
        if features.len() != self.input_len {
            return Err(EmotionError::FeatureLength {
                expected: self.input_len,
                actual: features.len(),
            }
            .into());
        }

        let scores = self.scorer.scores(features.as_slice())?;
        let (index, score) = arg_max(&scores).ok_or_else(|| anyhow!("model returned no scores"))?;
        let label = self.labels.get(index).cloned().ok_or(EmotionError::LabelCount {
            labels: self.labels.len(),
            scores: scores.len(),
        })?;

        if let Some(threshold) = self.min_confidence {
            if score < threshold {
                debug!(%label, score, threshold, "classification below confidence gate");
                return Ok(None);
            }
        }
        Ok(Some(Classification { label, score }))
    }
}

/// Index and value of the first maximum; NaN never wins.
pub fn arg_max(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Fixed {
        scores: Vec<f32>,
        declared: Option<usize>,
    }

    impl Scorer for Fixed {
        fn scores(&mut self, _features: &[f32]) -> Result<Vec<f32>> {
            Ok(self.scores.clone())
        }

        fn input_len(&self) -> Option<usize> {
            self.declared
        }
    }

    fn classifier(scores: Vec<f32>, declared: Option<usize>) -> std::result::Result<EmotionClassifier, EmotionError> {
        EmotionClassifier::new(Box::new(Fixed { scores, declared }), LabelVocabulary::builtin(), 4)
    }

    #[test]
    fn arg_max_takes_first_maximum_and_skips_nan() {
        assert_eq!(arg_max(&[0.1, 0.7, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(arg_max(&[f32::NAN, 0.3, 0.1]), Some((1, 0.3)));
        assert_eq!(arg_max(&[]), None);
    }

    #[test]
    fn classify_picks_highest_scoring_label() {
        let mut c = classifier(vec![0.0, 0.0, 0.1, 0.8, 0.05, 0.05, 0.0], None).unwrap();
        let out = c.classify(&FeatureVector(vec![0.0; 4])).unwrap().unwrap();
        assert_eq!(out.label.as_str(), "happy");
    }

    #[test]
    fn low_confidence_is_accepted_without_gate() {
        let scores = vec![0.15, 0.14, 0.14, 0.14, 0.14, 0.14, 0.15];
        let mut c = classifier(scores.clone(), None).unwrap();
        assert!(c.classify(&FeatureVector(vec![0.0; 4])).unwrap().is_some());

        let mut gated = classifier(scores, None).unwrap().with_min_confidence(Some(0.5));
        assert!(gated.classify(&FeatureVector(vec![0.0; 4])).unwrap().is_none());
    }

    #[test]
    fn declared_input_length_mismatch_fails_self_check() {
        match classifier(vec![0.0; 7], Some(1020)) {
            Err(EmotionError::FeatureLength { expected, actual }) => assert_eq!((expected, actual), (1020, 4)),
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn score_count_must_match_vocabulary() {
        assert!(matches!(
            classifier(vec![0.0; 5], None),
            Err(EmotionError::LabelCount { labels: 7, scores: 5 })
        ));
    }

    #[test]
    fn wrong_vector_length_at_inference_is_reported() {
        let mut c = classifier(vec![0.0; 7], None).unwrap();
        let err = c.classify(&FeatureVector(vec![0.0; 3])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EmotionError>(),
            Some(EmotionError::FeatureLength { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn loads_json_and_text_vocabularies() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("labels.json");
        fs::write(&json, r#"["calm", "excited"]"#).unwrap();
        let v = LabelVocabulary::load(&json).unwrap();
        assert_eq!(v.get(1).unwrap().as_str(), "excited");

        let txt = dir.path().join("labels.txt");
        fs::write(&txt, "happy\n\n sad \n").unwrap();
        let v = LabelVocabulary::load(&txt).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v.get(1).unwrap().as_str(), "sad");
    }

    fn npy_header(descr: &str, count: usize) -> Vec<u8> {
        let mut header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': ({count},), }}");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut out = b"\x93NUMPY\x01\x00".to_vec();
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out
    }

    fn npy_unicode(labels: &[&str], width: usize) -> Vec<u8> {
        let mut out = npy_header(&format!("<U{width}"), labels.len());
        for label in labels {
            let mut chars: Vec<u32> = label.chars().map(|c| c as u32).collect();
            chars.resize(width, 0);
            for c in chars {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn loads_numpy_unicode_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.npy");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(&npy_unicode(&DEFAULT_LABELS, 8)).unwrap();
        drop(f);

        let v = LabelVocabulary::load(&path).unwrap();
        assert_eq!(v, LabelVocabulary::builtin());
    }

    #[test]
    fn zero_width_npy_dtype_is_an_error() {
        for descr in ["<U0", "|S0"] {
            let bytes = npy_header(descr, 7);
            let err = parse_npy_strings(&bytes).unwrap_err();
            assert!(err.to_string().contains("zero-width"), "{descr}: {err}");
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.npy");
        fs::write(&path, npy_header("<U0", 7)).unwrap();
        assert!(matches!(LabelVocabulary::load(&path), Err(EmotionError::Labels(_))));
    }

    #[test]
    fn oversized_npy_shape_is_an_error() {
        let bytes = npy_header("<U8", usize::MAX / 2);
        assert!(parse_npy_strings(&bytes).is_err());
        let bytes = npy_header(&format!("<U{}", usize::MAX / 2), 1);
        assert!(parse_npy_strings(&bytes).is_err());
    }

    #[test]
    fn missing_vocabulary_fails_unless_default_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.npy");
        assert!(matches!(
            LabelVocabulary::load_or_default(&path, false),
            Err(EmotionError::Labels(_))
        ));
        assert_eq!(LabelVocabulary::load_or_default(&path, true).unwrap().len(), 7);
    }
}
