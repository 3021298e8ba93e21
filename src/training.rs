//! Signature (re)computation for pending tracks and profile bank rebuilds.

use crate::catalog::CatalogIndex;
use crate::media::AudioSource;
use crate::profiles::ProfileBank;
use crate::signature::{SignatureProvider, SignatureScheme};
use crate::store::{RecordStore, TRACKS};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Callback reporting `(processed_count, total, track_title)` after every
/// item, successful or not.
pub type ProgressSink = dyn Fn(usize, usize, &str) + Send + Sync;

/// Sequentially extracts signatures for pending tracks and rebuilds the
/// profile bank. Single logical worker: one track is fully handled
/// (extraction, persistence, progress) before the next starts.
pub struct TrainingPipeline {
    provider: Arc<dyn SignatureProvider>,
    audio: Arc<dyn AudioSource>,
    store: Arc<dyn RecordStore>,
    scheme: SignatureScheme,
}

impl TrainingPipeline {
    pub fn new(
        provider: Arc<dyn SignatureProvider>,
        audio: Arc<dyn AudioSource>,
        store: Arc<dyn RecordStore>,
        scheme: SignatureScheme,
    ) -> Self {
        Self {
            provider,
            audio,
            store,
            scheme,
        }
    }

    /// Discard and rebuild the profile bank from the catalog.
    ///
    /// Full rebuild over incremental patching is deliberate: the bank is
    /// always consistent with the catalog at the cost of an O(catalog)
    /// pass. Only tracks with a known artist and a current-scheme
    /// signature contribute.
    pub fn train_all(&self, index: &CatalogIndex, bank: &mut ProfileBank) {
        bank.clear();
        for track in index.iter() {
            if track.is_unknown_artist() {
                continue;
            }
            if let Some(signature) = &track.signature {
                if signature.matches_scheme(self.scheme) {
                    bank.insert(&track.artist, signature.clone());
                }
            }
        }
        info!(
            artists = bank.artist_count(),
            samples = bank.total_samples(),
            "Profile bank rebuilt"
        );
    }

    /// Extract signatures for every track that has audio but no
    /// current-scheme signature, then rebuild the bank.
    ///
    /// Per-track extraction failures are non-fatal; the track stays
    /// pending for the next run. A persistence failure aborts the batch
    /// and surfaces to the caller. Cancellation is observed between
    /// tracks, never mid-item. Returns the number of tracks whose
    /// signature was successfully stored.
    pub async fn process_pending(
        &self,
        index: &mut CatalogIndex,
        bank: &mut ProfileBank,
        progress: Option<&ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let pending: Vec<String> = index
            .iter()
            .filter(|t| t.is_pending_extraction(self.scheme))
            .map(|t| t.id.clone())
            .collect();
        let total = pending.len();
        info!(total, "Starting signature extraction for pending tracks");

        let mut succeeded = 0;
        for (i, id) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(processed = i, total, "Extraction batch cancelled");
                break;
            }

            let Some(track) = index.get(id).cloned() else {
                continue;
            };
            let title = track.title.clone();

            match self.extract_for(&track).await {
                Ok(signature) => {
                    let mut updated = track;
                    updated.signature = Some(signature);
                    let record = serde_json::to_value(&updated)
                        .context("Failed to serialize track")?;
                    self.store
                        .update(TRACKS, &record)
                        .with_context(|| format!("Failed to persist signature for {}", id))?;
                    index.replace(updated);
                    succeeded += 1;
                }
                Err(e) => {
                    warn!(track = %title, error = %e, "Signature extraction failed");
                }
            }

            if let Some(report) = progress {
                report(i + 1, total, &title);
            }

            // Give the host loop a chance to interleave or cancel between
            // items.
            tokio::task::yield_now().await;
        }

        self.train_all(index, bank);
        Ok(succeeded)
    }

    async fn extract_for(&self, track: &crate::catalog::Track) -> Result<crate::signature::Signature> {
        let audio_ref = track
            .audio_ref
            .as_deref()
            .context("Track has no audio reference")?;
        let bytes = self.audio.read(audio_ref).await?;
        Ok(self.provider.extract(&bytes).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Track, NO_ALBUM, UNKNOWN_ARTIST};
    use crate::media::MemoryAudioSource;
    use crate::signature::{ExtractionError, Signature};
    use crate::store::MemoryRecordStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SCHEME: SignatureScheme = SignatureScheme::EnergyProfile;

    /// Provider that derives a signature from the first audio byte, and
    /// fails on empty input.
    struct StubProvider {
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SignatureProvider for StubProvider {
        async fn extract(&self, audio: &[u8]) -> Result<Signature, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match audio.first() {
                Some(b) => Ok(Signature::new(
                    SCHEME,
                    vec![*b as f32 / 255.0; SCHEME.dimensions()],
                )),
                None => Err(ExtractionError::Decode("empty audio".to_string())),
            }
        }
    }

    struct Fixture {
        pipeline: TrainingPipeline,
        index: CatalogIndex,
        bank: ProfileBank,
        store: Arc<MemoryRecordStore>,
        audio: Arc<MemoryAudioSource>,
        provider: Arc<StubProvider>,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(StubProvider::new());
        let audio = Arc::new(MemoryAudioSource::new());
        let store = Arc::new(MemoryRecordStore::new());
        let pipeline = TrainingPipeline::new(
            provider.clone(),
            audio.clone(),
            store.clone(),
            SCHEME,
        );
        Fixture {
            pipeline,
            index: CatalogIndex::new(SCHEME),
            bank: ProfileBank::new(10),
            store,
            audio,
            provider,
        }
    }

    fn seed_track(f: &mut Fixture, title: &str, artist: &str, audio_ref: Option<&str>) -> Track {
        let track = Track::new(
            title.into(),
            artist.into(),
            NO_ALBUM.into(),
            audio_ref.map(String::from),
            None,
        );
        f.store
            .add(TRACKS, &serde_json::to_value(&track).unwrap())
            .unwrap();
        f.index.add(track.clone());
        track
    }

    #[tokio::test]
    async fn test_process_pending_extracts_and_persists() {
        let mut f = fixture();
        seed_track(&mut f, "Hello", "Adele", Some("hello.pcm"));
        f.audio.insert("hello.pcm", vec![128; 64]);

        let cancel = CancellationToken::new();
        let Fixture {
            pipeline,
            index,
            bank,
            ..
        } = &mut f;
        let processed = pipeline
            .process_pending(index, bank, None, &cancel)
            .await
            .unwrap();

        assert_eq!(processed, 1);
        let track = f.index.iter().next().unwrap();
        assert!(track.has_current_signature(SCHEME));
        assert_eq!(f.bank.sample_count("Adele"), 1);

        // The persisted record carries the signature too.
        let stored: Track =
            serde_json::from_value(f.store.list(TRACKS).unwrap()[0].clone()).unwrap();
        assert!(stored.signature.is_some());
    }

    #[tokio::test]
    async fn test_extraction_failure_is_non_fatal_and_retried() {
        let mut f = fixture();
        seed_track(&mut f, "Broken", "Adele", Some("broken.pcm"));
        seed_track(&mut f, "Fine", "Sade", Some("fine.pcm"));
        f.audio.insert("broken.pcm", vec![]);
        f.audio.insert("fine.pcm", vec![200; 64]);

        let cancel = CancellationToken::new();
        let progress_log: Arc<Mutex<Vec<(usize, usize, String)>>> = Arc::new(Mutex::new(vec![]));
        let log_sink = progress_log.clone();
        let sink = move |done: usize, total: usize, title: &str| {
            log_sink.lock().unwrap().push((done, total, title.to_string()));
        };

        let Fixture {
            pipeline,
            index,
            bank,
            ..
        } = &mut f;
        let processed = pipeline
            .process_pending(index, bank, Some(&sink), &cancel)
            .await
            .unwrap();
        assert_eq!(processed, 1);

        // Progress fired for both items, failure included.
        let log = progress_log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].1, 2);
        assert_eq!(log[1].0, 2);
        drop(log);

        // The failed track is still pending and revisited next run.
        f.audio.insert("broken.pcm", vec![50; 64]);
        let Fixture {
            pipeline,
            index,
            bank,
            ..
        } = &mut f;
        let processed = pipeline
            .process_pending(index, bank, None, &cancel)
            .await
            .unwrap();
        assert_eq!(processed, 1);
    }

    #[tokio::test]
    async fn test_tracks_without_audio_are_skipped() {
        let mut f = fixture();
        seed_track(&mut f, "No Audio", "Adele", None);

        let cancel = CancellationToken::new();
        let Fixture {
            pipeline,
            index,
            bank,
            provider,
            ..
        } = &mut f;
        let processed = pipeline
            .process_pending(index, bank, None, &cancel)
            .await
            .unwrap();

        assert_eq!(processed, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_item() {
        let mut f = fixture();
        for i in 0..5 {
            let audio_ref = format!("t{}.pcm", i);
            seed_track(&mut f, &format!("T{}", i), "Adele", Some(&audio_ref));
            f.audio.insert(&audio_ref, vec![100; 64]);
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let Fixture {
            pipeline,
            index,
            bank,
            ..
        } = &mut f;
        let processed = pipeline
            .process_pending(index, bank, None, &cancel)
            .await
            .unwrap();
        assert_eq!(processed, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_surfaces() {
        let mut f = fixture();
        seed_track(&mut f, "Hello", "Adele", Some("hello.pcm"));
        f.audio.insert("hello.pcm", vec![128; 64]);
        f.store.set_fail_writes(true);

        let cancel = CancellationToken::new();
        let Fixture {
            pipeline,
            index,
            bank,
            ..
        } = &mut f;
        let result = pipeline.process_pending(index, bank, None, &cancel).await;
        assert!(result.is_err());

        // Memory was not mutated ahead of the failed write.
        assert!(f.index.iter().next().unwrap().signature.is_none());
    }

    #[tokio::test]
    async fn test_train_all_excludes_unknown_and_legacy() {
        let mut f = fixture();
        let mut known = seed_track(&mut f, "Hello", "Adele", None);
        known.signature = Some(Signature::new(SCHEME, vec![0.5; SCHEME.dimensions()]));
        f.index.replace(known);

        let mut unknown = seed_track(&mut f, "Mystery", UNKNOWN_ARTIST, None);
        unknown.signature = Some(Signature::new(SCHEME, vec![0.5; SCHEME.dimensions()]));
        f.index.replace(unknown);

        let mut legacy = seed_track(&mut f, "Old", "Sade", None);
        legacy.signature = Some(Signature::new(
            SignatureScheme::Embedding,
            vec![0.5; SignatureScheme::Embedding.dimensions()],
        ));
        f.index.replace(legacy);

        f.pipeline.train_all(&f.index, &mut f.bank);
        assert_eq!(f.bank.sample_count("Adele"), 1);
        assert_eq!(f.bank.sample_count("Sade"), 0);
        assert_eq!(f.bank.artist_count(), 1);
    }
}
