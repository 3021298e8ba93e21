//! The catalog service facade: single entry point tying together the
//! record store, the signature provider, the catalog index, the profile
//! bank and the training pipeline.

use crate::catalog::{reconcile, AddOutcome, CatalogIndex, DedupReport, Track, TrackMeta};
use crate::config::EngineSettings;
use crate::media::AudioSource;
use crate::profiles::{IdentificationEngine, ProfileBank};
use crate::signature::{Signature, SignatureProvider};
use crate::store::{RecordStore, TRACKS};
use crate::training::{ProgressSink, TrainingPipeline};
use anyhow::Context;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Track not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

pub struct CatalogService {
    store: Arc<dyn RecordStore>,
    audio: Arc<dyn AudioSource>,
    provider: Arc<dyn SignatureProvider>,
    settings: EngineSettings,
    index: CatalogIndex,
    bank: ProfileBank,
    engine: IdentificationEngine,
    pipeline: TrainingPipeline,
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        audio: Arc<dyn AudioSource>,
        provider: Arc<dyn SignatureProvider>,
        settings: EngineSettings,
    ) -> Self {
        let scheme = settings.active_scheme;
        let pipeline = TrainingPipeline::new(
            provider.clone(),
            audio.clone(),
            store.clone(),
            scheme,
        );
        Self {
            store,
            audio,
            provider,
            index: CatalogIndex::new(scheme),
            bank: ProfileBank::new(settings.bank_cap),
            engine: IdentificationEngine::new(scheme, settings.match_threshold()),
            pipeline,
            settings,
        }
    }

    /// Load the catalog from the store, reconcile historical duplicates
    /// and build the profile bank.
    pub fn initialize(&mut self) -> Result<DedupReport, CatalogError> {
        let records = self.store.list(TRACKS)?;
        let mut tracks = Vec::with_capacity(records.len());
        for record in records {
            let track: Track = serde_json::from_value(record)
                .context("Failed to deserialize track record")?;
            tracks.push(track);
        }
        info!(tracks = tracks.len(), "Catalog loaded");

        self.index.load(tracks);
        let report = reconcile(&mut self.index, self.store.as_ref())?;
        self.pipeline.train_all(&self.index, &mut self.bank);
        Ok(report)
    }

    /// Tear down the service, dropping in-memory state. Every mutation has
    /// already been persisted through the store, so there is nothing to
    /// flush.
    pub fn shutdown(self) {
        info!(tracks = self.index.len(), "Catalog service shut down");
    }

    /// Add a track to the catalog, or merge it into an existing one with
    /// the same identity.
    ///
    /// Extraction is attempted inline when audio is available; failure
    /// leaves the track pending for the next `process_pending` run and is
    /// never a reason to reject the add.
    pub async fn add(
        &mut self,
        meta: TrackMeta,
        filename: Option<&str>,
        audio_ref: Option<String>,
    ) -> Result<AddOutcome, CatalogError> {
        let (title, artist, album) = meta.resolve(filename);
        let scheme = self.settings.active_scheme;

        let candidate = Track::new(title, artist, album, audio_ref, None);
        let key = candidate.identity_key();

        if let Some(existing) = self.index.find_by_key(&key) {
            let mut merged = existing.clone();
            let mut changed = crate::catalog::merge_tracks(&mut merged, &candidate, scheme);

            // A re-import is a chance to fill in a missing signature.
            if merged.is_pending_extraction(scheme) {
                if let Some(signature) = self.try_extract(merged.audio_ref.as_deref()).await {
                    merged.signature = Some(signature);
                    changed = true;
                }
            }

            if changed {
                self.persist_update(&merged)?;
                self.index.replace(merged.clone());
                self.learn_from(&merged);
            }
            return Ok(AddOutcome::Merged {
                track: merged,
                changed,
            });
        }

        let mut track = candidate;
        track.signature = self.try_extract(track.audio_ref.as_deref()).await;

        let record = serde_json::to_value(&track).context("Failed to serialize track")?;
        self.store.add(TRACKS, &record)?;
        let outcome = self.index.add(track.clone());
        self.learn_from(&track);
        info!(track_id = %track.id, title = %track.title, artist = %track.artist, "Track added");

        if track.is_unknown_artist() {
            if let Some(suggested) = track.signature.as_ref().and_then(|s| self.identify(s)) {
                info!(track_id = %track.id, artist = %suggested, "Possible author identified");
            }
        }
        Ok(outcome)
    }

    /// Suggest an artist for the given signature, if any reference is
    /// close enough.
    pub fn identify(&self, signature: &Signature) -> Option<String> {
        self.engine.identify(&self.bank, signature)
    }

    /// Suggest an artist for an Unknown-artist track from its own
    /// signature.
    pub fn suggest_artist(&self, track_id: &str) -> Option<String> {
        let track = self.index.get(track_id)?;
        if !track.is_unknown_artist() {
            return None;
        }
        let signature = track.signature.as_ref()?;
        self.identify(signature)
    }

    /// Accept an identification suggestion: reassign the track to the
    /// artist, backfill a placeholder album from the artist's other
    /// tracks, and retrain. Only the album is backfilled; the cover is
    /// left as-is.
    pub fn confirm_identification(
        &mut self,
        track_id: &str,
        artist: &str,
    ) -> Result<Track, CatalogError> {
        let track = self
            .index
            .get(track_id)
            .ok_or_else(|| CatalogError::NotFound(track_id.to_string()))?;

        let mut updated = track.clone();
        updated.artist = crate::catalog::clean_display(artist);

        if updated.has_placeholder_album() {
            let sibling_album = self
                .index
                .iter()
                .find(|t| {
                    t.id != updated.id
                        && crate::catalog::normalize(&t.artist)
                            == crate::catalog::normalize(&updated.artist)
                        && !t.has_placeholder_album()
                })
                .map(|t| t.album.clone());
            if let Some(album) = sibling_album {
                updated.album = album;
            }
        }

        self.persist_update(&updated)?;
        self.index.replace(updated.clone());
        self.pipeline.train_all(&self.index, &mut self.bank);
        info!(track_id = %updated.id, artist = %updated.artist, "Identification confirmed");
        Ok(updated)
    }

    /// Increment a track's play counter.
    pub fn record_play(&mut self, track_id: &str) -> Result<u64, CatalogError> {
        let track = self
            .index
            .get(track_id)
            .ok_or_else(|| CatalogError::NotFound(track_id.to_string()))?;
        let mut updated = track.clone();
        updated.play_count += 1;
        self.persist_update(&updated)?;
        let count = updated.play_count;
        self.index.replace(updated);
        Ok(count)
    }

    /// Extract signatures for all pending tracks and rebuild the bank.
    pub async fn process_pending(
        &mut self,
        progress: Option<&ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<usize, CatalogError> {
        let processed = self
            .pipeline
            .process_pending(&mut self.index, &mut self.bank, progress, cancel)
            .await?;
        Ok(processed)
    }

    pub fn get(&self, track_id: &str) -> Option<&Track> {
        self.index.get(track_id)
    }

    pub fn all_tracks(&self) -> Vec<Track> {
        self.index.list()
    }

    pub fn pending_count(&self) -> usize {
        let scheme = self.settings.active_scheme;
        self.index
            .iter()
            .filter(|t| t.is_pending_extraction(scheme))
            .count()
    }

    /// Tracks still attributed to the Unknown sentinel.
    pub fn unknown_tracks(&self) -> Vec<Track> {
        self.index
            .iter()
            .filter(|t| t.is_unknown_artist())
            .cloned()
            .collect()
    }

    /// All distinct artists, alphabetically, excluding the Unknown
    /// sentinel.
    pub fn all_artists(&self) -> Vec<String> {
        let mut artists: Vec<String> = self
            .index
            .iter()
            .filter(|t| !t.is_unknown_artist())
            .map(|t| t.artist.clone())
            .collect();
        artists.sort();
        artists.dedup();
        artists
    }

    pub fn tracks_by_artist(&self, artist: &str) -> Vec<Track> {
        let wanted = crate::catalog::normalize(artist);
        self.index
            .iter()
            .filter(|t| crate::catalog::normalize(&t.artist) == wanted)
            .cloned()
            .collect()
    }

    /// Tracks of one album by one artist.
    pub fn tracks_of(&self, artist: &str, album: &str) -> Vec<Track> {
        let wanted = crate::catalog::normalize(album);
        self.tracks_by_artist(artist)
            .into_iter()
            .filter(|t| crate::catalog::normalize(&t.album) == wanted)
            .collect()
    }

    /// Distinct albums of an artist, alphabetically.
    pub fn albums_of(&self, artist: &str) -> Vec<String> {
        let mut albums: Vec<String> = self
            .tracks_by_artist(artist)
            .into_iter()
            .map(|t| t.album)
            .collect();
        albums.sort();
        albums.dedup();
        albums
    }

    /// Case-insensitive substring search across title, artist and album.
    /// An empty term matches every track.
    pub fn search(&self, query: &str) -> Vec<Track> {
        let needle = query.to_lowercase();
        self.index
            .iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.artist.to_lowercase().contains(&needle)
                    || t.album.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    pub fn bank_stats(&self) -> (usize, usize) {
        (self.bank.artist_count(), self.bank.total_samples())
    }

    fn persist_update(&self, track: &Track) -> Result<(), CatalogError> {
        let record = serde_json::to_value(track).context("Failed to serialize track")?;
        self.store
            .update(TRACKS, &record)
            .with_context(|| format!("Failed to persist track {}", track.id))?;
        Ok(())
    }

    /// Opportunistically add a track's signature to the bank without a
    /// full retrain.
    fn learn_from(&mut self, track: &Track) {
        if track.is_unknown_artist() {
            return;
        }
        if let Some(signature) = &track.signature {
            if signature.matches_scheme(self.settings.active_scheme) {
                self.bank.insert(&track.artist, signature.clone());
            }
        }
    }

    async fn try_extract(&self, audio_ref: Option<&str>) -> Option<Signature> {
        let audio_ref = audio_ref?;
        let bytes = match self.audio.read(audio_ref).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(audio_ref, error = %e, "Failed to read audio, track stays pending");
                return None;
            }
        };
        match self.provider.extract(&bytes).await {
            Ok(signature) => Some(signature),
            Err(e) => {
                warn!(audio_ref, error = %e, "Signature extraction failed, track stays pending");
                None
            }
        }
    }
}
