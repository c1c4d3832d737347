use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use image::Rgb;
use parking_lot::Mutex;

use emotune::classifier::{EmotionClassifier, EmotionLabel, LabelVocabulary, Scorer};
use emotune::config::AppConfig;
use emotune::error::EmotionError;
use emotune::features::FeatureLayout;
use emotune::history::{HistoryEvent, HistoryRecorder, HistorySink, SessionContext};
use emotune::landmarks::LandmarkModel;
use emotune::pipeline::{EmotionPipeline, Pipeline};
use emotune::state::{EmotionSlot, EmotionState, FileSlot, MemorySlot};
use emotune::types::{Frame, LandmarkSet, Landmarks, Point3D};
use emotune::worker::{PipelineWorker, Submit, WorkerEvent};

const LABELS: [&str; 4] = ["angry", "happy", "neutral", "sad"];
const TAG_STEP: f32 = 0.01;

/// Returns queued landmark sets in order, then nothing.
struct ScriptedModel {
    script: VecDeque<LandmarkSet>,
    seen_widths: Arc<Mutex<Vec<u32>>>,
}

impl ScriptedModel {
    fn new(script: Vec<LandmarkSet>) -> Self {
        Self {
            script: script.into(),
            seen_widths: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl LandmarkModel for ScriptedModel {
    fn name(&self) -> String {
        "Scripted".to_string()
    }

    fn detect(&mut self, frame: &Frame) -> anyhow::Result<LandmarkSet> {
        self.seen_widths.lock().push(frame.width());
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

/// One-hot on the label encoded in the first face offset; counts every call.
struct TagScorer {
    classes: usize,
    calls: Arc<AtomicUsize>,
}

impl Scorer for TagScorer {
    fn scores(&mut self, features: &[f32]) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tag = (features[0] / TAG_STEP).round().max(0.0) as usize;
        let mut scores = vec![0.1; self.classes];
        scores[tag.min(self.classes - 1)] = 0.9;
        Ok(scores)
    }

    fn input_len(&self) -> Option<usize> {
        Some(FeatureLayout::default().len())
    }
}

/// Slot that remembers every write.
#[derive(Default)]
struct RecordingSlot {
    inner: MemorySlot,
    writes: Mutex<Vec<String>>,
}

impl EmotionSlot for RecordingSlot {
    fn load(&self) -> Option<EmotionLabel> {
        self.inner.load()
    }

    fn store(&self, label: &EmotionLabel) -> anyhow::Result<()> {
        self.writes.lock().push(label.to_string());
        self.inner.store(label)
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.writes.lock().push(String::new());
        self.inner.clear()
    }

    fn take(&self) -> anyhow::Result<Option<EmotionLabel>> {
        self.writes.lock().push(String::new());
        self.inner.take()
    }
}

#[derive(Clone, Default)]
struct VecSink(Arc<Mutex<Vec<HistoryEvent>>>);

impl HistorySink for VecSink {
    fn record(&mut self, event: &HistoryEvent) -> anyhow::Result<()> {
        self.0.lock().push(event.clone());
        Ok(())
    }
}

fn face_for(label: &str) -> Landmarks {
    let tag = LABELS.iter().position(|l| *l == label).expect("known label");
    let mut points = vec![Point3D::new(0.5, 0.5, 0.0); 468];
    points[0].x += tag as f32 * TAG_STEP;
    Landmarks::new(points)
}

fn with_face(label: &str) -> LandmarkSet {
    LandmarkSet {
        face: Some(face_for(label)),
        ..LandmarkSet::default()
    }
}

fn frame() -> Frame {
    Frame::from_fn(64, 48, |x, _| if x < 32 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) })
}

fn classifier(calls: Arc<AtomicUsize>) -> EmotionClassifier {
    let scorer = TagScorer {
        classes: LABELS.len(),
        calls,
    };
    EmotionClassifier::new(Box::new(scorer), LabelVocabulary::new(LABELS), FeatureLayout::default().len())
        .expect("self-check passes")
}

fn pipeline(script: Vec<LandmarkSet>, state: EmotionState) -> (EmotionPipeline, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let classifier = classifier(calls.clone());
    // The self-check inference is not a frame.
    calls.store(0, Ordering::SeqCst);
    let p = EmotionPipeline::with_model(Box::new(ScriptedModel::new(script)), FeatureLayout::default(), classifier, state);
    (p, calls)
}

#[test]
fn no_face_skips_classification_and_keeps_state() {
    let state = EmotionState::in_memory();
    state.update(&EmotionLabel::from("sad")).unwrap();
    let (mut p, calls) = pipeline(vec![LandmarkSet::empty(), LandmarkSet::empty()], state.clone());

    for _ in 0..2 {
        let out = p.process(&frame()).unwrap();
        assert!(out.emotion.is_none());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(state.current(), Some(EmotionLabel::from("sad")));
}

#[test]
fn latest_classification_wins() {
    let state = EmotionState::in_memory();
    let script = vec![with_face("angry"), with_face("happy"), with_face("sad")];
    let (mut p, calls) = pipeline(script, state.clone());

    let labels: Vec<String> = (0..3)
        .map(|_| p.process(&frame()).unwrap().emotion.unwrap().label.to_string())
        .collect();
    assert_eq!(labels, ["angry", "happy", "sad"]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(state.current(), Some(EmotionLabel::from("sad")));
}

#[test]
fn reset_reads_empty_until_next_detection() {
    let state = EmotionState::in_memory();
    let (mut p, _) = pipeline(vec![with_face("happy"), LandmarkSet::empty(), with_face("neutral")], state.clone());

    p.process(&frame()).unwrap();
    state.reset().unwrap();
    assert!(state.is_empty());

    p.process(&frame()).unwrap();
    assert!(state.is_empty(), "no-face frame must not repopulate the state");

    p.process(&frame()).unwrap();
    assert_eq!(state.current(), Some(EmotionLabel::from("neutral")));
}

#[test]
fn five_frame_session_ends_on_last_face() {
    let slot = Arc::new(RecordingSlot::default());
    let state = EmotionState::new(slot.clone());
    let script = vec![
        LandmarkSet::empty(),
        LandmarkSet::empty(),
        with_face("sad"),
        with_face("sad"),
        with_face("neutral"),
    ];
    let (mut p, _) = pipeline(script, state.clone());

    for i in 0..5 {
        p.process(&frame()).unwrap();
        if i < 2 {
            assert!(slot.writes.lock().is_empty(), "state changed after faceless frame {}", i + 1);
            assert!(state.is_empty());
        }
    }
    assert_eq!(*slot.writes.lock(), ["sad", "sad", "neutral"]);
    assert_eq!(state.current(), Some(EmotionLabel::from("neutral")));
}

#[test]
fn known_happy_vector_classifies_as_happy() {
    let layout = FeatureLayout::default();
    let mut classifier = classifier(Arc::new(AtomicUsize::new(0)));
    let features = layout.build(&with_face("happy")).unwrap().unwrap();

    let result = classifier.classify(&features).unwrap().unwrap();
    assert_eq!(result.label.as_str(), "happy");
}

#[test]
fn landmark_count_mismatch_disables_pipeline() {
    let state = EmotionState::in_memory();
    let short_face = LandmarkSet {
        face: Some(Landmarks::new(vec![Point3D::default(); 478])),
        ..LandmarkSet::default()
    };
    let (mut p, calls) = pipeline(vec![short_face, with_face("happy")], state.clone());

    let err = p.process(&frame()).unwrap_err();
    assert!(matches!(err.downcast_ref::<EmotionError>(), Some(EmotionError::Unavailable(_))));
    assert!(p.disabled_reason().is_some());

    // Stays off even though the next frame would be valid.
    let err = p.process(&frame()).unwrap_err();
    assert!(matches!(err.downcast_ref::<EmotionError>(), Some(EmotionError::Unavailable(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(state.is_empty());
}

#[test]
fn model_with_wrong_input_length_fails_self_check() {
    struct ShortModel;
    impl Scorer for ShortModel {
        fn scores(&mut self, _: &[f32]) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.0; LABELS.len()])
        }
        fn input_len(&self) -> Option<usize> {
            Some(936)
        }
    }

    let err = EmotionClassifier::new(Box::new(ShortModel), LabelVocabulary::new(LABELS), 1020).err();
    assert!(matches!(err, Some(EmotionError::FeatureLength { expected: 936, actual: 1020 })));
}

#[test]
fn annotated_frame_is_mirrored_and_same_size() {
    let (mut p, _) = pipeline(vec![LandmarkSet::empty()], EmotionState::in_memory());
    let input = frame();

    let out = p.process(&input).unwrap();
    assert_eq!(out.annotated.dimensions(), input.dimensions());
    assert_eq!(*out.annotated.get_pixel(0, 0), Rgb([0, 0, 255]));
    assert_eq!(*out.annotated.get_pixel(63, 0), Rgb([255, 0, 0]));
}

#[test]
fn overlay_follows_the_shared_style_and_can_be_turned_off() {
    let green = Rgb([0, 255, 0]);
    let (p, _) = pipeline(vec![with_face("happy"); 3], EmotionState::in_memory());
    let style = p.annotation_style();
    style.write().mesh_color = green;
    let mut p = p;

    // Mesh points sit at the frame centre.
    assert_eq!(*p.process(&frame()).unwrap().annotated.get_pixel(33, 25), green);

    style.write().show_mesh = false;
    assert_eq!(*p.process(&frame()).unwrap().annotated.get_pixel(33, 25), Rgb([255, 0, 0]));

    style.write().show_mesh = true;
    let mut p = p.with_annotation(false);
    let out = p.process(&frame()).unwrap();
    assert_eq!(out.annotated, image::imageops::flip_horizontal(&frame()));
    assert_eq!(out.emotion.unwrap().label.as_str(), "happy");
}

#[test]
fn file_state_is_visible_to_a_second_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("emotion_state.json");
    let (mut p, _) = pipeline(vec![with_face("angry")], EmotionState::new(Arc::new(FileSlot::new(&path))));

    p.process(&frame()).unwrap();

    let reader = EmotionState::file(&path);
    assert_eq!(reader.take().unwrap(), Some(EmotionLabel::from("angry")));
    assert!(reader.is_empty());
}

#[test]
fn history_records_label_changes_only() {
    let sink = VecSink::default();
    let session = SessionContext {
        username: "dana".to_string(),
        language: "English".to_string(),
        artist: String::new(),
    };
    let script = vec![with_face("sad"), with_face("sad"), LandmarkSet::empty(), with_face("happy")];
    let (p, _) = pipeline(script, EmotionState::in_memory());
    let mut p = p.with_history(HistoryRecorder::new(Box::new(sink.clone()), session, true));

    for _ in 0..4 {
        p.process(&frame()).unwrap();
    }
    let events = sink.0.lock();
    let labels: Vec<&str> = events.iter().map(|e| e.emotion.as_str()).collect();
    assert_eq!(labels, ["sad", "happy"]);
    assert!(events.iter().all(|e| e.username == "dana" && e.language == "English"));
}

#[test]
fn worker_delivers_results_and_reports_stop() {
    let short_face = LandmarkSet {
        face: Some(Landmarks::new(vec![Point3D::default(); 10])),
        ..LandmarkSet::default()
    };
    let state = EmotionState::in_memory();
    let (p, _) = pipeline(vec![with_face("neutral"), short_face], state.clone());
    let worker = PipelineWorker::spawn(p).unwrap();

    assert_eq!(worker.submit(frame()), Submit::Accepted);
    match worker.recv() {
        Some(WorkerEvent::Frame(analysis)) => {
            assert_eq!(analysis.emotion.unwrap().label.as_str(), "neutral");
        }
        other => panic!("expected a frame result, got {other:?}"),
    }
    assert_eq!(state.current(), Some(EmotionLabel::from("neutral")));

    assert_eq!(worker.submit(frame()), Submit::Accepted);
    assert!(matches!(worker.recv(), Some(WorkerEvent::Stopped(_))));
    assert!(worker.recv().is_none());
    worker.shutdown();
}

/// Holds its first frame until the test lets it go.
struct GatedModel {
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
    first: bool,
}

impl LandmarkModel for GatedModel {
    fn name(&self) -> String {
        "Gated".to_string()
    }

    fn detect(&mut self, _: &Frame) -> anyhow::Result<LandmarkSet> {
        if std::mem::take(&mut self.first) {
            self.entered.wait();
            self.release.wait();
        }
        Ok(LandmarkSet::empty())
    }
}

#[test]
fn busy_worker_drops_frames_beyond_the_waiting_one() {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let model = GatedModel {
        entered: entered.clone(),
        release: release.clone(),
        first: true,
    };
    let p = EmotionPipeline::with_model(
        Box::new(model),
        FeatureLayout::default(),
        classifier(Arc::new(AtomicUsize::new(0))),
        EmotionState::in_memory(),
    );
    let worker = PipelineWorker::spawn(p).unwrap();

    assert_eq!(worker.submit(frame()), Submit::Accepted);
    entered.wait();
    // First frame is inside the model; one more may wait, the rest are dropped.
    assert_eq!(worker.submit(frame()), Submit::Accepted);
    assert_eq!(worker.submit(frame()), Submit::Busy);
    assert_eq!(worker.submit(frame()), Submit::Busy);
    release.wait();

    for _ in 0..2 {
        assert!(matches!(worker.recv(), Some(WorkerEvent::Frame(_))));
    }
    assert!(worker.try_next().is_none());
    worker.shutdown();
}

#[test]
fn stopped_worker_reports_closed() {
    let short_face = LandmarkSet {
        face: Some(Landmarks::new(vec![Point3D::default(); 10])),
        ..LandmarkSet::default()
    };
    let (p, _) = pipeline(vec![short_face], EmotionState::in_memory());
    let worker = PipelineWorker::spawn(p).unwrap();

    assert_eq!(worker.submit(frame()), Submit::Accepted);
    assert!(matches!(worker.recv(), Some(WorkerEvent::Stopped(_))));
    // Event channel closes when the thread exits, so the frame side is gone too.
    assert!(worker.recv().is_none());
    assert_eq!(worker.submit(frame()), Submit::Closed);
    worker.shutdown();
}

/// Config whose model and label paths all point at files in `dir`; `present` ones exist.
fn config_in(dir: &std::path::Path, present: &[&str]) -> AppConfig {
    let mut config = AppConfig::default();
    let path = |name: &str| dir.join(name).to_string_lossy().into_owned();
    config.models.face_detection_path = path("face_detection.onnx");
    config.models.face_mesh_path = path("face_mesh.onnx");
    config.models.hand_landmark_path = None;
    config.models.emotion_model_path = path("emotion.onnx");
    config.models.labels_path = path("labels.json");
    config.storage.record_history = false;
    for name in present {
        let content = if *name == "labels.json" { r#"["angry","happy","neutral","sad"]"# } else { "not a model" };
        fs::write(dir.join(name), content).unwrap();
    }
    config
}

fn startup_error(config: &AppConfig) -> EmotionError {
    match EmotionPipeline::from_config(config, EmotionState::in_memory(), Default::default()) {
        Ok(_) => panic!("pipeline started without its files"),
        Err(e) => e,
    }
}

#[test]
fn missing_model_file_is_a_model_load_error() {
    let all = ["face_detection.onnx", "face_mesh.onnx", "emotion.onnx", "labels.json"];
    for absent in &all[..3] {
        let dir = tempfile::tempdir().unwrap();
        let present: Vec<&str> = all.iter().copied().filter(|n| n != absent).collect();
        let config = config_in(dir.path(), &present);

        match startup_error(&config) {
            EmotionError::ModelLoad(msg) => assert!(msg.contains(absent), "{absent}: {msg}"),
            other => panic!("{absent}: expected ModelLoad, got {other:?}"),
        }
    }
}

#[test]
fn missing_labels_without_fallback_is_a_labels_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), &["face_detection.onnx", "face_mesh.onnx", "emotion.onnx"]);
    assert!(matches!(startup_error(&config), EmotionError::Labels(_)));
}

#[test]
fn missing_labels_with_fallback_still_needs_the_models() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path(), &[]);
    config.models.allow_default_labels = true;
    assert!(matches!(startup_error(&config), EmotionError::ModelLoad(_)));
}
