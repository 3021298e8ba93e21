use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

use voiceprint_catalog::catalog::AddOutcome;
use voiceprint_catalog::media::FsAudioSource;
use voiceprint_catalog::signature::{EmbeddingClient, EnergyProfileExtractor};
use voiceprint_catalog::{
    AppConfig, CatalogService, CliConfig, FileConfig, SignatureProvider, SqliteRecordStore,
    TrackMeta,
};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "flac", "wav", "m4a", "opus", "pcm"];

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(value_parser = parse_path)]
    pub catalog_db: PathBuf,

    /// Path to the media directory audio references resolve against.
    /// Defaults to the parent of the catalog database.
    #[clap(long, value_parser = parse_path)]
    pub media_path: Option<PathBuf>,

    /// Path to an optional TOML configuration file. Values in the file
    /// override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Signature scheme: "energy_profile" or "embedding".
    #[clap(long)]
    pub scheme: Option<String>,

    /// Maximum reference signatures retained per artist.
    #[clap(long)]
    pub bank_cap: Option<usize>,

    /// URL of the embedding inference service (required for the
    /// embedding scheme).
    #[clap(long)]
    pub embedding_url: Option<String>,

    /// Timeout in seconds for embedding service requests.
    #[clap(long)]
    pub embedding_timeout_sec: Option<u64>,

    /// Directory of audio files to import into the catalog, using the
    /// "Artist - Album - Title" filename convention.
    #[clap(long, value_parser = parse_path)]
    pub import: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_path: Some(cli_args.catalog_db.clone()),
        media_path: cli_args.media_path.clone(),
        scheme: cli_args.scheme.clone(),
        bank_cap: cli_args.bank_cap,
        embedding_url: cli_args.embedding_url.clone(),
        embedding_timeout_sec: cli_args.embedding_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite catalog database at {:?}...", config.db_path);
    let store = Arc::new(SqliteRecordStore::open(&config.db_path)?);
    let audio = Arc::new(FsAudioSource::new(config.media_path.clone()));

    let provider: Arc<dyn SignatureProvider> = match &config.embedding {
        Some(embedding_config) => {
            info!(
                "Embedding service configured at {}",
                embedding_config.base_url
            );
            Arc::new(EmbeddingClient::new(embedding_config.clone()))
        }
        None => Arc::new(EnergyProfileExtractor::new()),
    };

    let mut service = CatalogService::new(store, audio, provider, config.engine.clone());

    let report = service.initialize()?;
    if report.removed > 0 {
        info!(
            merged = report.merged,
            absorbed = report.absorbed,
            removed = report.removed,
            "Startup reconciliation cleaned up duplicates"
        );
    }

    if let Some(import_dir) = &cli_args.import {
        import_directory(&mut service, import_dir, &config.media_path).await?;
    }

    let pending = service.pending_count();
    if pending > 0 {
        let cancel = tokio_util::sync::CancellationToken::new();
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, finishing current track...");
                signal_cancel.cancel();
            }
        });

        let bar = ProgressBar::new(pending as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .context("Invalid progress bar template")?,
        );
        let bar_sink = bar.clone();
        let sink = move |_done: usize, _total: usize, title: &str| {
            bar_sink.set_message(title.to_string());
            bar_sink.inc(1);
        };

        let processed = service.process_pending(Some(&sink), &cancel).await?;
        bar.finish_and_clear();
        info!(processed, pending, "Signature extraction done");
    }

    for track in service.unknown_tracks() {
        if let Some(artist) = service.suggest_artist(&track.id) {
            println!(
                "{} ({}) looks like it could be by {}",
                track.title, track.id, artist
            );
        }
    }

    let (artists, samples) = service.bank_stats();
    info!(
        tracks = service.all_tracks().len(),
        artists,
        samples,
        "Catalog ready"
    );
    service.shutdown();
    Ok(())
}

/// Walk a directory and add every audio file to the catalog. The audio
/// reference is stored relative to the media root when the file lives
/// under it, absolute otherwise.
async fn import_directory(
    service: &mut CatalogService,
    dir: &Path,
    media_root: &Path,
) -> Result<()> {
    let mut imported = 0usize;
    let mut merged = 0usize;

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().to_string();
        let audio_ref = entry
            .path()
            .strip_prefix(media_root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();

        let outcome = service
            .add(TrackMeta::default(), Some(&filename), Some(audio_ref))
            .await?;
        match outcome {
            AddOutcome::Inserted(_) => imported += 1,
            AddOutcome::Merged { .. } => merged += 1,
        }
    }

    info!(imported, merged, "Import finished");
    Ok(())
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
