mod dedup;
mod index;
mod track;

pub use dedup::{reconcile, DedupReport};
pub use index::{AddOutcome, CatalogIndex};
pub use track::{
    clean_display, merge_tracks, normalize, IdentityKey, Track, TrackMeta, NO_ALBUM,
    PLACEHOLDER_COVER, UNKNOWN_ARTIST,
};
