//! Catalog reconciliation: merges records colliding on identity and absorbs
//! Unknown-artist duplicates of known tracks.
//!
//! Run at startup and safe to re-run any time; a second pass over a clean
//! catalog is a no-op. All removals and survivor updates go through the
//! record store before the in-memory index is touched.

use super::index::CatalogIndex;
use super::track::{merge_tracks, normalize, Track};
use crate::store::{RecordStore, TRACKS};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Summary of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupReport {
    /// Records merged into an identity-key survivor.
    pub merged: usize,
    /// Unknown-artist records absorbed by a known-artist track with the
    /// same title.
    pub absorbed: usize,
    /// Total records removed from the store.
    pub removed: usize,
}

/// Run a full reconciliation pass over the catalog.
pub fn reconcile(index: &mut CatalogIndex, store: &dyn RecordStore) -> Result<DedupReport> {
    let scheme = index.active_scheme();
    let snapshot = index.list();

    let mut report = DedupReport::default();
    let mut survivors: Vec<Track> = Vec::with_capacity(snapshot.len());
    let mut by_key: HashMap<_, usize> = HashMap::new();
    let mut changed_ids: HashSet<String> = HashSet::new();
    let mut remove_ids: Vec<String> = Vec::new();

    // Stage 1: collapse exact identity collisions, accumulating each
    // group's useful fields into the first-seen survivor.
    for track in snapshot {
        match by_key.entry(track.identity_key()) {
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(survivors.len());
                survivors.push(track);
            }
            std::collections::hash_map::Entry::Occupied(e) => {
                let survivor = &mut survivors[*e.get()];
                if merge_tracks(survivor, &track, scheme) {
                    changed_ids.insert(survivor.id.clone());
                }
                debug!(survivor = %survivor.id, duplicate = %track.id, "Merging duplicate");
                remove_ids.push(track.id);
                report.merged += 1;
            }
        }
    }

    // Stage 2: an Unknown-artist track whose title matches a known-artist
    // track is a re-import without metadata; move its signature over (if
    // the known track lacks one) and drop it.
    let mut known_by_title: HashMap<String, usize> = HashMap::new();
    for (i, track) in survivors.iter().enumerate() {
        if !track.is_unknown_artist() {
            known_by_title.entry(normalize(&track.title)).or_insert(i);
        }
    }

    let mut absorb_pairs: Vec<(usize, usize)> = Vec::new();
    for (i, track) in survivors.iter().enumerate() {
        if track.is_unknown_artist() {
            if let Some(&k) = known_by_title.get(&normalize(&track.title)) {
                absorb_pairs.push((i, k));
            }
        }
    }

    let mut dropped: HashSet<usize> = HashSet::new();
    for (unknown_idx, known_idx) in absorb_pairs {
        if survivors[known_idx].signature.is_none() && survivors[unknown_idx].signature.is_some() {
            survivors[known_idx].signature = survivors[unknown_idx].signature.clone();
            changed_ids.insert(survivors[known_idx].id.clone());
        }
        remove_ids.push(survivors[unknown_idx].id.clone());
        dropped.insert(unknown_idx);
        report.absorbed += 1;
    }

    // Persist before mutating the index.
    for track in &survivors {
        if changed_ids.contains(&track.id) {
            let record = serde_json::to_value(track).context("Failed to serialize track")?;
            store
                .update(TRACKS, &record)
                .with_context(|| format!("Failed to persist merged track {}", track.id))?;
        }
    }
    for id in &remove_ids {
        store
            .remove(TRACKS, id)
            .with_context(|| format!("Failed to remove duplicate track {}", id))?;
    }
    report.removed = remove_ids.len();

    index.clear();
    for (i, track) in survivors.into_iter().enumerate() {
        if !dropped.contains(&i) {
            index.add(track);
        }
    }

    if report.removed > 0 {
        info!(
            merged = report.merged,
            absorbed = report.absorbed,
            removed = report.removed,
            "Catalog reconciliation removed duplicates"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::track::{NO_ALBUM, UNKNOWN_ARTIST};
    use crate::signature::{Signature, SignatureScheme};
    use crate::store::MemoryRecordStore;

    const SCHEME: SignatureScheme = SignatureScheme::Embedding;

    fn sig(fill: f32) -> Signature {
        Signature::new(SCHEME, vec![fill; SCHEME.dimensions()])
    }

    /// Seed store and index as if loaded from a dirty historical catalog:
    /// records go in raw, without add-time merging.
    fn seeded(tracks: Vec<Track>) -> (CatalogIndex, MemoryRecordStore) {
        let store = MemoryRecordStore::new();
        for t in &tracks {
            store.add(TRACKS, &serde_json::to_value(t).unwrap()).unwrap();
        }
        let mut index = CatalogIndex::new(SCHEME);
        index.load(tracks);
        (index, store)
    }

    fn raw_track(title: &str, artist: &str, album: &str) -> Track {
        Track::new(title.into(), artist.into(), album.into(), None, None)
    }

    #[test]
    fn test_exact_duplicates_collapse_to_one_survivor() {
        let a = raw_track("Hello", "Adele", NO_ALBUM);
        let mut b = raw_track("Hello", "Adele", "21");
        b.signature = Some(sig(0.4));

        let (mut index, store) = seeded(vec![a, b]);
        let report = reconcile(&mut index, &store).unwrap();

        assert_eq!(report.merged, 1);
        assert_eq!(index.len(), 1);
        let survivor = index.iter().next().unwrap();
        assert_eq!(survivor.album, "21");
        assert!(survivor.signature.is_some());
        assert_eq!(store.list(TRACKS).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_track_absorbed_by_known_title() {
        let mut unknown = raw_track("Hello", UNKNOWN_ARTIST, NO_ALBUM);
        unknown.signature = Some(sig(0.8));
        let known = raw_track("Hello", "Adele", "21");

        let (mut index, store) = seeded(vec![known.clone(), unknown.clone()]);
        let report = reconcile(&mut index, &store).unwrap();

        assert_eq!(report.absorbed, 1);
        assert_eq!(index.len(), 1);
        let survivor = index.get(&known.id).unwrap();
        assert_eq!(survivor.artist, "Adele");
        assert!(survivor.signature.is_some(), "signature moved over");
        assert!(index.get(&unknown.id).is_none());
    }

    #[test]
    fn test_absorption_keeps_existing_signature() {
        let mut unknown = raw_track("Hello", UNKNOWN_ARTIST, NO_ALBUM);
        unknown.signature = Some(sig(0.8));
        let mut known = raw_track("Hello", "Adele", "21");
        known.signature = Some(sig(0.2));

        let (mut index, store) = seeded(vec![known.clone(), unknown]);
        reconcile(&mut index, &store).unwrap();

        let survivor = index.get(&known.id).unwrap();
        assert_eq!(survivor.signature.as_ref().unwrap().values[0], 0.2);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut unknown = raw_track("Hello", UNKNOWN_ARTIST, NO_ALBUM);
        unknown.signature = Some(sig(0.8));
        let known = raw_track("Hello", "Adele", "21");
        let other = raw_track("Skyfall", "Adele", NO_ALBUM);

        let (mut index, store) = seeded(vec![known, unknown, other]);
        let first = reconcile(&mut index, &store).unwrap();
        assert!(first.removed > 0);

        let after_first = index.list();
        let second = reconcile(&mut index, &store).unwrap();
        assert_eq!(second, DedupReport::default());
        assert_eq!(index.len(), after_first.len());
    }

    #[test]
    fn test_unknown_without_known_counterpart_is_kept() {
        let unknown = raw_track("Mystery Song", UNKNOWN_ARTIST, NO_ALBUM);
        let (mut index, store) = seeded(vec![unknown.clone()]);
        let report = reconcile(&mut index, &store).unwrap();

        assert_eq!(report, DedupReport::default());
        assert!(index.get(&unknown.id).is_some());
    }
}
