//! In-memory catalog index enforcing canonical track identity.

use super::track::{merge_tracks, IdentityKey, Track};
use crate::signature::SignatureScheme;
use tracing::debug;

/// Outcome of an insert-or-merge.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    /// A new record was inserted.
    Inserted(Track),
    /// An existing record with the same identity absorbed the candidate.
    Merged { track: Track, changed: bool },
}

impl AddOutcome {
    pub fn track(&self) -> &Track {
        match self {
            AddOutcome::Inserted(t) => t,
            AddOutcome::Merged { track, .. } => track,
        }
    }
}

/// The set of track records, at most one per normalized `(artist, title)`
/// identity key.
///
/// Purely in-memory; persistence ordering is the caller's concern (the
/// service persists through the record store before mutating this index).
pub struct CatalogIndex {
    active_scheme: SignatureScheme,
    tracks: Vec<Track>,
}

impl CatalogIndex {
    pub fn new(active_scheme: SignatureScheme) -> Self {
        Self {
            active_scheme,
            tracks: Vec::new(),
        }
    }

    pub fn active_scheme(&self) -> SignatureScheme {
        self.active_scheme
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Insert the candidate, or merge it into the existing record sharing
    /// its identity key. The existing record keeps its id.
    pub fn add(&mut self, candidate: Track) -> AddOutcome {
        let key = candidate.identity_key();
        let scheme = self.active_scheme;
        if let Some(existing) = self.find_by_key_mut(&key) {
            let changed = merge_tracks(existing, &candidate, scheme);
            debug!(track_id = %existing.id, changed, "Merged duplicate add");
            let track = existing.clone();
            return AddOutcome::Merged { track, changed };
        }
        self.tracks.push(candidate.clone());
        AddOutcome::Inserted(candidate)
    }

    pub fn find_by_key(&self, key: &IdentityKey) -> Option<&Track> {
        self.tracks.iter().find(|t| &t.identity_key() == key)
    }

    fn find_by_key_mut(&mut self, key: &IdentityKey) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| &t.identity_key() == key)
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Replace the record with the same id. Returns false if absent.
    pub fn replace(&mut self, track: Track) -> bool {
        match self.tracks.iter_mut().find(|t| t.id == track.id) {
            Some(slot) => {
                *slot = track;
                true
            }
            None => false,
        }
    }

    /// Remove by id. Returns the removed record, if any.
    pub fn remove(&mut self, id: &str) -> Option<Track> {
        let pos = self.tracks.iter().position(|t| t.id == id)?;
        Some(self.tracks.remove(pos))
    }

    /// Replace the whole index with records loaded from the store, without
    /// merging. Historical catalogs may contain identity collisions; a
    /// reconciliation pass is expected to follow so that removals reach
    /// the store as well.
    pub fn load(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn list(&self) -> Vec<Track> {
        self.tracks.clone()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::track::NO_ALBUM;

    fn track(title: &str, artist: &str, album: &str) -> Track {
        Track::new(title.into(), artist.into(), album.into(), None, None)
    }

    #[test]
    fn test_add_inserts_new_track() {
        let mut index = CatalogIndex::new(SignatureScheme::Embedding);
        let outcome = index.add(track("Hello", "Adele", "21"));
        assert!(matches!(outcome, AddOutcome::Inserted(_)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_add_merges_on_identity_collision() {
        let mut index = CatalogIndex::new(SignatureScheme::Embedding);
        let first = index.add(track("Hello", "Adele", NO_ALBUM)).track().clone();
        let outcome = index.add(track(" hello ", "ADELE", "21"));

        match outcome {
            AddOutcome::Merged { track, changed } => {
                assert!(changed);
                assert_eq!(track.id, first.id, "identity is unchanged");
                assert_eq!(track.album, "21", "richer album wins");
            }
            other => panic!("expected merge, got {:?}", other),
        }
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_identity_uniqueness_over_add_sequences() {
        let mut index = CatalogIndex::new(SignatureScheme::Embedding);
        for _ in 0..5 {
            index.add(track("Hello", "Adele", "21"));
            index.add(track("Hello", "Adele", NO_ALBUM));
            index.add(track("Skyfall", "Adele", NO_ALBUM));
        }
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_remove_and_replace() {
        let mut index = CatalogIndex::new(SignatureScheme::Embedding);
        let inserted = index.add(track("Hello", "Adele", "21")).track().clone();

        let mut updated = inserted.clone();
        updated.play_count = 3;
        assert!(index.replace(updated));
        assert_eq!(index.get(&inserted.id).unwrap().play_count, 3);

        assert!(index.remove(&inserted.id).is_some());
        assert!(index.remove(&inserted.id).is_none());
        assert!(index.is_empty());
    }
}
