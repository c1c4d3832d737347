//! Per-user music preferences, remembered between runs so `--language`/`--artist` are only
//! needed when they change.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub language: String,
    pub artist: String,
}

/// JSON object keyed by username.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_all(&self) -> Result<BTreeMap<String, Preferences>> {
        let content = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        serde_json::from_slice(&content).with_context(|| format!("parsing {}", self.path.display()))
    }

    pub fn get(&self, username: &str) -> Preferences {
        match self.load_all() {
            Ok(mut all) => all.remove(username).unwrap_or_default(),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "unreadable preferences, ignoring");
                Preferences::default()
            }
        }
    }

    /// Fails without touching the file when the existing content can't be read.
    pub fn save(&self, username: &str, prefs: &Preferences) -> Result<()> {
        let mut all = self.load_all()?;
        all.insert(username.to_string(), prefs.clone());

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &all)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!(user = username, "preferences saved");
        Ok(())
    }

    /// Values given on the command line win and are remembered; omitted ones come from the
    /// saved preferences. A failed save is logged and the resolved values are still used.
    pub fn resolve(&self, username: &str, language: Option<&str>, artist: Option<&str>) -> Preferences {
        let saved = self.get(username);
        let resolved = Preferences {
            language: language.map_or_else(|| saved.language.clone(), str::to_string),
            artist: artist.map_or_else(|| saved.artist.clone(), str::to_string),
        };
        if resolved != saved {
            if let Err(e) = self.save(username, &resolved) {
                warn!(error = %format!("{e:#}"), "preferences not saved");
            }
        }
        resolved
    }
}
