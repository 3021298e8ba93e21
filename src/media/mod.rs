//! Resolution of opaque audio references to raw bytes.
//!
//! The engine never interprets audio itself; it hands the bytes to the
//! signature provider. `audio_ref` values stay opaque pass-through strings
//! everywhere else.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Resolves an opaque `audio_ref` to the referenced audio bytes.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn read(&self, audio_ref: &str) -> Result<Vec<u8>>;
}

/// Audio source reading refs as paths relative to a media directory.
pub struct FsAudioSource {
    root: PathBuf,
}

impl FsAudioSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl AudioSource for FsAudioSource {
    async fn read(&self, audio_ref: &str) -> Result<Vec<u8>> {
        let path = self.root.join(audio_ref);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read audio file {:?}", path))
    }
}

/// In-memory audio source for tests.
#[derive(Default)]
pub struct MemoryAudioSource {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAudioSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, audio_ref: &str, bytes: Vec<u8>) {
        self.blobs
            .lock()
            .unwrap()
            .insert(audio_ref.to_string(), bytes);
    }
}

#[async_trait]
impl AudioSource for MemoryAudioSource {
    async fn read(&self, audio_ref: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(audio_ref)
            .cloned()
            .with_context(|| format!("No audio blob for ref {}", audio_ref))
    }
}
