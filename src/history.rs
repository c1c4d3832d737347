//! Append-only detection history and the aggregates shown on the analytics view.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::classifier::EmotionLabel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub username: String,
    pub emotion: EmotionLabel,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub artist: String,
}

/// Who is in front of the camera and what they asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub username: String,
    pub language: String,
    pub artist: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            username: "anonymous".to_string(),
            language: String::new(),
            artist: String::new(),
        }
    }
}

pub trait HistorySink: Send {
    fn record(&mut self, event: &HistoryEvent) -> Result<()>;
}

/// JSON-lines file, one event per line.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &HistoryEvent) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening history {}", self.path.display()))?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Every readable event; malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<HistoryEvent>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("opening history {}", self.path.display())),
        };

        let mut events = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEvent>(&line) {
                Ok(e) => events.push(e),
                Err(e) => warn!(line = n + 1, error = %e, "skipping malformed history entry"),
            }
        }
        Ok(events)
    }

    /// Export a user's events, newest first, to a CSV file.
    pub fn export_csv(&self, username: &str, out: impl AsRef<Path>) -> Result<usize> {
        let out = out.as_ref();
        let events = self.for_user(username)?;
        let file = fs::File::create(out).with_context(|| format!("creating {}", out.display()))?;
        write_csv(&events, file)
    }

    /// A user's events, newest first.
    pub fn for_user(&self, username: &str) -> Result<Vec<HistoryEvent>> {
        let mut events: Vec<_> = self
            .read_all()?
            .into_iter()
            .filter(|e| e.username == username)
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }
}

/// Write events as CSV with a header row. Returns how many rows were written.
pub fn write_csv<W: Write>(events: &[HistoryEvent], out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["timestamp", "username", "emotion", "language", "artist"])?;
    for e in events {
        let timestamp = e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        writer.write_record([
            timestamp.as_str(),
            e.username.as_str(),
            e.emotion.as_str(),
            e.language.as_str(),
            e.artist.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(events.len())
}

impl HistorySink for HistoryLog {
    fn record(&mut self, event: &HistoryEvent) -> Result<()> {
        self.append(event)
    }
}

/// Turns pipeline detections into history events for one session.
pub struct HistoryRecorder {
    sink: Box<dyn HistorySink>,
    context: SessionContext,
    dedupe: bool,
    last: Option<EmotionLabel>,
}

impl HistoryRecorder {
    pub fn new(sink: Box<dyn HistorySink>, context: SessionContext, dedupe: bool) -> Self {
        Self {
            sink,
            context,
            dedupe,
            last: None,
        }
    }

    /// Record one detection. Returns whether an event was written.
    pub fn observe(&mut self, label: &EmotionLabel) -> Result<bool> {
        if self.dedupe && self.last.as_ref() == Some(label) {
            return Ok(false);
        }
        let event = HistoryEvent {
            username: self.context.username.clone(),
            emotion: label.clone(),
            timestamp: Utc::now(),
            language: self.context.language.clone(),
            artist: self.context.artist.clone(),
        };
        self.sink.record(&event)?;
        debug!(emotion = %label, user = %event.username, "history event recorded");
        self.last = Some(label.clone());
        Ok(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmotionStats {
    pub total: usize,
    /// Descending by count, ties by label.
    pub by_emotion: Vec<(EmotionLabel, usize)>,
    pub by_hour: [usize; 24],
    /// Monday first.
    pub by_weekday: [usize; 7],
    pub last: Option<HistoryEvent>,
    pub top_language: Option<String>,
    pub top_artist: Option<String>,
}

impl EmotionStats {
    pub fn from_events(events: &[HistoryEvent]) -> Self {
        let mut counts: HashMap<&EmotionLabel, usize> = HashMap::new();
        let mut by_hour = [0; 24];
        let mut by_weekday = [0; 7];
        let mut languages: HashMap<&str, usize> = HashMap::new();
        let mut artists: HashMap<&str, usize> = HashMap::new();

        for e in events {
            *counts.entry(&e.emotion).or_default() += 1;
            by_hour[e.timestamp.hour() as usize] += 1;
            by_weekday[e.timestamp.weekday().num_days_from_monday() as usize] += 1;
            if !e.language.is_empty() {
                *languages.entry(e.language.as_str()).or_default() += 1;
            }
            if !e.artist.is_empty() {
                *artists.entry(e.artist.as_str()).or_default() += 1;
            }
        }

        let mut by_emotion: Vec<(EmotionLabel, usize)> =
            counts.into_iter().map(|(l, c)| (l.clone(), c)).collect();
        by_emotion.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

        Self {
            total: events.len(),
            by_emotion,
            by_hour,
            by_weekday,
            last: events.iter().max_by_key(|e| e.timestamp).cloned(),
            top_language: most_common(languages),
            top_artist: most_common(artists),
        }
    }

    pub fn unique_emotions(&self) -> usize {
        self.by_emotion.len()
    }

    pub fn dominant(&self) -> Option<&EmotionLabel> {
        self.by_emotion.first().map(|(l, _)| l)
    }

    pub fn busiest_weekday(&self) -> Option<Weekday> {
        let (idx, count) = self
            .by_weekday
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(&a.0)))?;
        if *count == 0 {
            return None;
        }
        Some((0..idx).fold(Weekday::Mon, |day, _| day.succ()))
    }
}

fn most_common(counts: HashMap<&str, usize>) -> Option<String> {
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(k, _)| k.to_string())
}
