//! Current-emotion state: one latest-value slot, shared between the frame pipeline (writer)
//! and everything that wants to know what the user is feeling right now (readers).

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::classifier::EmotionLabel;

/// Single-value store behind the current emotion. Implementations replace the whole value
/// at once; a reader sees either the old label or the new one, never a mix.
pub trait EmotionSlot: Send + Sync {
    fn load(&self) -> Option<EmotionLabel>;
    fn store(&self, label: &EmotionLabel) -> Result<()>;
    fn clear(&self) -> Result<()>;

    /// Read and clear in one step. A value stored concurrently is either returned here or
    /// left in the slot, never cleared unseen.
    fn take(&self) -> Result<Option<EmotionLabel>>;
}

/// In-process slot.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: RwLock<Option<EmotionLabel>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmotionSlot for MemorySlot {
    fn load(&self) -> Option<EmotionLabel> {
        self.value.read().clone()
    }

    fn store(&self, label: &EmotionLabel) -> Result<()> {
        *self.value.write() = Some(label.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.value.write() = None;
        Ok(())
    }

    fn take(&self) -> Result<Option<EmotionLabel>> {
        Ok(self.value.write().take())
    }
}

/// Slot persisted as a one-element JSON array (`["happy"]`, cleared as `[""]`), so separate
/// processes observe the latest detection. Writes go through a temp file + rename.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    fn parse(&self, content: &[u8]) -> Option<EmotionLabel> {
        match serde_json::from_slice::<Vec<String>>(content) {
            Ok(values) => values
                .into_iter()
                .next()
                .filter(|v| !v.is_empty())
                .map(EmotionLabel::new),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "unreadable emotion slot, treating as empty");
                None
            }
        }
    }

    fn write_value(&self, value: &str) -> Result<()> {
        let dir = self.dir();
        fs::create_dir_all(dir)
            .with_context(|| format!("creating state directory {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer(&mut tmp, &[value])?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl EmotionSlot for FileSlot {
    fn load(&self) -> Option<EmotionLabel> {
        let content = fs::read(&self.path).ok()?;
        self.parse(&content)
    }

    fn store(&self, label: &EmotionLabel) -> Result<()> {
        self.write_value(label.as_str())
    }

    fn clear(&self) -> Result<()> {
        self.write_value("")
    }

    /// Claims the file by renaming it away. A store racing with this lands in a fresh file and
    /// stays readable; the slot reads as empty until then.
    fn take(&self) -> Result<Option<EmotionLabel>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let claimed = tempfile::Builder::new()
            .prefix(".emotion-take")
            .tempfile_in(self.dir())
            .with_context(|| format!("creating temp file in {}", self.dir().display()))?
            .into_temp_path();
        match fs::rename(&self.path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("claiming {}", self.path.display())),
        }
        let content = fs::read(&claimed)
            .with_context(|| format!("reading {}", claimed.display()))?;
        Ok(self.parse(&content))
    }
}

/// Handle to the current emotion, cheap to clone and hand to every consumer.
#[derive(Clone)]
pub struct EmotionState {
    slot: Arc<dyn EmotionSlot>,
}

impl EmotionState {
    pub fn new(slot: Arc<dyn EmotionSlot>) -> Self {
        Self { slot }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySlot::new()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileSlot::new(path)))
    }

    /// Latest detected label, `None` meaning nothing detected yet.
    pub fn current(&self) -> Option<EmotionLabel> {
        self.slot.load()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_none()
    }

    /// Overwrite with the newest classification. Latest frame always wins.
    pub fn update(&self, label: &EmotionLabel) -> Result<()> {
        self.slot.store(label)
    }

    pub fn reset(&self) -> Result<()> {
        self.slot.clear()
    }

    /// Read the current label and clear it, for consumers that use a detection once.
    pub fn take(&self) -> Result<Option<EmotionLabel>> {
        self.slot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_slot_latest_wins_and_reset() {
        let state = EmotionState::in_memory();
        assert!(state.is_empty());
        for l in ["sad", "happy", "neutral"] {
            state.update(&EmotionLabel::from(l)).unwrap();
        }
        assert_eq!(state.current().unwrap().as_str(), "neutral");
        state.reset().unwrap();
        assert_eq!(state.current(), None);
    }

    #[test]
    fn file_slot_survives_new_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emotion.json");

        EmotionState::file(&path).update(&EmotionLabel::from("happy")).unwrap();
        let other = EmotionState::file(&path);
        assert_eq!(other.current().unwrap().as_str(), "happy");
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"["happy"]"#);
    }

    #[test]
    fn file_slot_clear_writes_empty_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("emotion.json");
        let state = EmotionState::file(&path);
        state.update(&EmotionLabel::from("sad")).unwrap();
        state.reset().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"[""]"#);
        assert!(state.is_empty());
    }

    #[test]
    fn missing_or_garbage_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emotion.json");
        let slot = FileSlot::new(&path);
        assert_eq!(slot.load(), None);

        fs::write(&path, b"\x93NUMPY garbage").unwrap();
        assert_eq!(slot.load(), None);

        fs::write(&path, "[]").unwrap();
        assert_eq!(slot.load(), None);
    }

    #[test]
    fn take_consumes_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = EmotionState::file(dir.path().join("emotion.json"));
        state.update(&EmotionLabel::from("fear")).unwrap();
        assert_eq!(state.take().unwrap().unwrap().as_str(), "fear");
        assert_eq!(state.take().unwrap(), None);
        assert!(state.is_empty());

        let memory = EmotionState::in_memory();
        memory.update(&EmotionLabel::from("fear")).unwrap();
        assert_eq!(memory.take().unwrap().unwrap().as_str(), "fear");
        assert_eq!(memory.take().unwrap(), None);
    }

    #[test]
    fn take_never_clears_an_unseen_detection() {
        let dir = tempfile::tempdir().unwrap();
        let state = EmotionState::file(dir.path().join("emotion.json"));
        state.update(&EmotionLabel::from("happy")).unwrap();

        let writer = {
            let state = state.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    state.update(&EmotionLabel::new(format!("label{i}"))).unwrap();
                }
            })
        };
        let mut taken = Vec::new();
        for _ in 0..100 {
            taken.extend(state.take().unwrap());
        }
        writer.join().unwrap();
        taken.extend(state.take().unwrap());

        // The final write is either consumed by a take or still readable; it is never lost.
        assert!(taken.iter().any(|l| l.as_str() == "label99"), "last detection lost: {taken:?}");
        assert_eq!(state.take().unwrap(), None);
    }

    #[test]
    fn concurrent_readers_never_see_partial_labels() {
        let dir = tempfile::tempdir().unwrap();
        let state = EmotionState::file(dir.path().join("emotion.json"));
        state.update(&EmotionLabel::from("happy")).unwrap();

        let writer = {
            let state = state.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    let l = if i % 2 == 0 { "surprise" } else { "happy" };
                    state.update(&EmotionLabel::from(l)).unwrap();
                }
            })
        };
        for _ in 0..200 {
            if let Some(l) = state.current() {
                assert!(l.as_str() == "happy" || l.as_str() == "surprise", "torn read: {l}");
            }
        }
        writer.join().unwrap();
    }
}
