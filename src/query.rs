//! Music search links built from the current emotion and the user's preferences.

use std::fmt;

use crate::classifier::EmotionLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    YouTube,
    YouTubeMusic,
    Spotify,
    AppleMusic,
    SoundCloud,
    AmazonMusic,
    Pandora,
    Deezer,
}

impl Platform {
    pub const PRIMARY: [Platform; 4] = [Platform::YouTube, Platform::YouTubeMusic, Platform::Spotify, Platform::AppleMusic];
    pub const MORE: [Platform; 4] = [Platform::SoundCloud, Platform::AmazonMusic, Platform::Pandora, Platform::Deezer];

    pub fn name(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::YouTubeMusic => "YT Music",
            Platform::Spotify => "Spotify",
            Platform::AppleMusic => "Apple Music",
            Platform::SoundCloud => "SoundCloud",
            Platform::AmazonMusic => "Amazon Music",
            Platform::Pandora => "Pandora",
            Platform::Deezer => "Deezer",
        }
    }

    /// Search URL for an already `+`-joined query.
    pub fn search_url(&self, query: &str) -> String {
        match self {
            Platform::YouTube => format!("https://www.youtube.com/results?search_query={query}"),
            Platform::YouTubeMusic => format!("https://music.youtube.com/search?q={query}"),
            Platform::Spotify => format!("https://open.spotify.com/search/{query}"),
            Platform::AppleMusic => format!("https://music.apple.com/search?term={query}"),
            Platform::SoundCloud => format!("https://soundcloud.com/search?q={query}"),
            Platform::AmazonMusic => format!("https://music.amazon.com/search/{query}"),
            Platform::Pandora => format!("https://www.pandora.com/search/{query}"),
            Platform::Deezer => format!("https://www.deezer.com/search/{query}"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Genre words appended to a query for each emotion.
pub fn emotion_keywords(emotion: &str) -> Option<&'static str> {
    match emotion {
        "happy" => Some("upbeat energetic"),
        "sad" => Some("emotional slow"),
        "angry" => Some("intense rock"),
        "neutral" => Some("popular hits"),
        "surprise" => Some("dance upbeat"),
        "fear" => Some("calming soft"),
        "disgust" => Some("alternative indie"),
        _ => None,
    }
}

/// Something still needed before a query can be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Emotion,
    Language,
    Artist,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Missing::Emotion => "emotion",
            Missing::Language => "language",
            Missing::Artist => "artist",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicQuery {
    pub emotion: EmotionLabel,
    pub language: String,
    pub artist: String,
}

impl MusicQuery {
    /// Build a query, or report everything that is still missing.
    pub fn new(
        emotion: Option<EmotionLabel>,
        language: &str,
        artist: &str,
    ) -> Result<Self, Vec<Missing>> {
        let language = language.trim();
        let artist = artist.trim();
        let missing = Self::missing(emotion.as_ref(), language, artist);
        match emotion {
            Some(emotion) if missing.is_empty() => Ok(Self {
                emotion,
                language: language.to_string(),
                artist: artist.to_string(),
            }),
            _ => Err(missing),
        }
    }

    pub fn missing(emotion: Option<&EmotionLabel>, language: &str, artist: &str) -> Vec<Missing> {
        let mut missing = Vec::new();
        if emotion.map_or(true, |l| l.as_str().trim().is_empty()) {
            missing.push(Missing::Emotion);
        }
        if language.trim().is_empty() {
            missing.push(Missing::Language);
        }
        if artist.trim().is_empty() {
            missing.push(Missing::Artist);
        }
        missing
    }

    fn boost(&self) -> &str {
        emotion_keywords(self.emotion.as_str()).unwrap_or(self.emotion.as_str())
    }

    /// `"{language} {artist} {keywords}"`, `+`-joined.
    pub fn enhanced(&self) -> String {
        format!("{} {} {}", self.language, self.artist, self.boost()).replace(' ', "+")
    }

    /// `"{language}+{emotion}+song+{artist}+{keywords}"`, the single best-match query.
    pub fn smart(&self) -> String {
        let keywords = emotion_keywords(self.emotion.as_str()).unwrap_or("");
        format!("{}+{}+song+{}+{}", self.language, self.emotion, self.artist, keywords).replace(' ', "+")
    }

    pub fn links(&self) -> Vec<(Platform, String)> {
        let q = self.enhanced();
        Platform::PRIMARY
            .iter()
            .chain(Platform::MORE.iter())
            .map(|p| (*p, p.search_url(&q)))
            .collect()
    }

    pub fn best_match_url(&self) -> String {
        Platform::YouTube.search_url(&self.smart())
    }
}
