//! The track record and its identity/merge semantics.

use crate::signature::{Signature, SignatureScheme};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved artist value meaning "no known attribution". Excluded from the
/// profile bank and never returned by identification.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Placeholder album for tracks imported without album metadata.
pub const NO_ALBUM: &str = "No Album";

/// Default cover reference assigned at creation.
pub const PLACEHOLDER_COVER: &str = "covers/placeholder.png";

/// Normalized `(artist, title)` pair used to detect duplicate entries.
/// Album is deliberately excluded so re-imports with different album
/// metadata collide and merge instead of duplicating.
pub type IdentityKey = (String, String);

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Trim and collapse internal whitespace, preserving case. Applied to
/// display strings on write.
pub fn clean_display(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A track in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Absent until successfully extracted. A signature from a scheme other
    /// than the deployment's active one is legacy and treated as pending.
    pub signature: Option<Signature>,
    pub cover_ref: String,
    /// Opaque reference to the audio blob; never interpreted here.
    pub audio_ref: Option<String>,
    pub play_count: u64,
    pub added_at: DateTime<Utc>,
}

impl Track {
    /// Construct a new track with a fresh id and placeholder cover.
    pub fn new(
        title: String,
        artist: String,
        album: String,
        audio_ref: Option<String>,
        signature: Option<Signature>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: clean_display(&title),
            artist: clean_display(&artist),
            album: clean_display(&album),
            signature,
            cover_ref: PLACEHOLDER_COVER.to_string(),
            audio_ref,
            play_count: 0,
            added_at: Utc::now(),
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        (normalize(&self.artist), normalize(&self.title))
    }

    pub fn is_unknown_artist(&self) -> bool {
        self.artist == UNKNOWN_ARTIST
    }

    pub fn has_placeholder_album(&self) -> bool {
        self.album.is_empty() || self.album == NO_ALBUM
    }

    pub fn has_placeholder_cover(&self) -> bool {
        self.cover_ref == PLACEHOLDER_COVER
    }

    /// Whether this track carries a signature of the active scheme.
    pub fn has_current_signature(&self, scheme: SignatureScheme) -> bool {
        self.signature
            .as_ref()
            .map(|s| s.matches_scheme(scheme))
            .unwrap_or(false)
    }

    /// Whether this track still needs extraction: it has audio but no
    /// current-scheme signature.
    pub fn is_pending_extraction(&self, scheme: SignatureScheme) -> bool {
        self.audio_ref.is_some() && !self.has_current_signature(scheme)
    }
}

/// Incoming metadata for `CatalogService::add`. Fields left `None` fall
/// back to the `"Artist - Album - Title"` filename convention, then to
/// sentinels.
#[derive(Debug, Clone, Default)]
pub struct TrackMeta {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl TrackMeta {
    /// Resolve display fields from explicit metadata and an optional
    /// filename, in that order of preference.
    ///
    /// Filename convention: `"Artist - Album - Title.ext"`. With only two
    /// parts the album is missing (`"Artist - Title.ext"`); a bare filename
    /// is all title.
    pub fn resolve(&self, filename: Option<&str>) -> (String, String, String) {
        let from_name = filename.map(parse_filename).unwrap_or_default();

        let title = self
            .title
            .as_deref()
            .map(clean_display)
            .filter(|s| !s.is_empty())
            .or(from_name.title)
            .unwrap_or_else(|| "Untitled".to_string());
        let artist = self
            .artist
            .as_deref()
            .map(clean_display)
            .filter(|s| !s.is_empty())
            .or(from_name.artist)
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
        let album = self
            .album
            .as_deref()
            .map(clean_display)
            .filter(|s| !s.is_empty() && s != UNKNOWN_ARTIST)
            .or(from_name.album)
            .unwrap_or_else(|| NO_ALBUM.to_string());

        (title, artist, album)
    }
}

#[derive(Debug, Default)]
struct ParsedName {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
}

fn parse_filename(filename: &str) -> ParsedName {
    let stem = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains(' ') => stem,
        _ => filename,
    };

    let parts: Vec<&str> = stem.split(" - ").map(str::trim).collect();
    match parts.as_slice() {
        [artist, album, title @ ..] if parts.len() >= 3 => ParsedName {
            artist: Some(clean_display(artist)),
            album: Some(clean_display(album)),
            title: Some(clean_display(&title.join(" - "))),
        },
        [artist, title] => ParsedName {
            artist: Some(clean_display(artist)),
            album: None,
            title: Some(clean_display(title)),
        },
        _ => ParsedName {
            artist: None,
            album: None,
            title: Some(clean_display(stem)).filter(|s| !s.is_empty()),
        },
    }
}

/// Field-wise merge of `incoming` into `existing` when two records collide
/// on identity. Each field independently keeps the best available value:
/// a real album over the placeholder, a real cover over the default, a
/// present signature over an absent one and an active-scheme signature
/// over a legacy one. Returns whether anything changed.
pub fn merge_tracks(existing: &mut Track, incoming: &Track, scheme: SignatureScheme) -> bool {
    let mut changed = false;

    if existing.has_placeholder_album() && !incoming.has_placeholder_album() {
        existing.album = incoming.album.clone();
        changed = true;
    }

    if existing.has_placeholder_cover() && !incoming.has_placeholder_cover() {
        existing.cover_ref = incoming.cover_ref.clone();
        changed = true;
    }

    let incoming_better_signature = match (&existing.signature, &incoming.signature) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(old), Some(new)) => !old.matches_scheme(scheme) && new.matches_scheme(scheme),
    };
    if incoming_better_signature {
        existing.signature = incoming.signature.clone();
        changed = true;
    }

    if existing.audio_ref.is_none() && incoming.audio_ref.is_some() {
        existing.audio_ref = incoming.audio_ref.clone();
        changed = true;
    }

    changed
}
