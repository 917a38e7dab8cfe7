//! The contract this crate requires from the BitTorrent protocol engine.
//!
//! The engine itself (peer wire protocol, piece hashing, tracker/DHT traffic, bencode codec)
//! is an external collaborator. This module only describes the operations the rest of the
//! crate consumes from it, modeled as an async trait so that tests can substitute
//! [MockTorrentEngine] for a real implementation.

use async_trait::async_trait;
use derive_more::Display;
use fx_handle::Handle;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// Unique identifier of a torrent that has been added to the engine.
pub type TorrentHandle = Handle;

/// The SHA-1 info-hash of a torrent's info dictionary.
/// Used as the identity key for cache entries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    /// Renders the info-hash as a lowercase hex string, e.g. for use as a cache file name.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A single file within a torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    /// The path of the file relative to the torrent's root.
    pub path: PathBuf,
    /// The size of the file in bytes.
    pub length: u64,
    /// The index of the file within the torrent.
    pub file_index: usize,
}

/// Metadata of a torrent once it is known (either parsed from a `.torrent` file
/// or received from the swarm).
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentMetadata {
    /// The display name of the torrent.
    pub name: String,
    /// The fixed size of a piece, in bytes. The final piece of the torrent may be shorter.
    pub piece_length: u32,
    /// The total number of pieces the torrent is divided into.
    pub num_pieces: u32,
    /// The files contained within the torrent, sorted by file index.
    pub files: Vec<FileEntry>,
}

impl TorrentMetadata {
    /// The file with the largest size, used when the consumer enumerates a torrent as a playlist.
    pub fn largest_file(&self) -> Option<&FileEntry> {
        self.files.iter().max_by_key(|f| f.length)
    }
}

/// The storage allocation strategy requested from the engine at download start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Allocate,
    Sparse,
}

/// The parameters needed by the engine to add a torrent to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct AddTorrentParams {
    pub info_hash: InfoHash,
    /// Present when the location already carried a full torrent-info (file input);
    /// absent for magnet input until the metadata fetcher fills it in.
    pub torrent_info: Option<TorrentMetadata>,
    pub resume_data: Option<Vec<u8>>,
    pub trackers: Vec<String>,
    pub save_path: PathBuf,
    pub storage_mode: StorageMode,
}

impl AddTorrentParams {
    pub fn has_torrent_metadata(&self) -> bool {
        self.torrent_info.is_some()
    }
}

/// The lifecycle state of a torrent as observed through the engine's status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TorrentState {
    #[display("queued for checking")]
    QueuedForChecking,
    #[display("downloading metadata")]
    DownloadingMetadata,
    #[display("checking resume data")]
    CheckingResume,
    #[display("allocating")]
    Allocating,
    #[display("checking files")]
    CheckingFiles,
    #[display("downloading")]
    Downloading,
    #[display("finished")]
    Finished,
    #[display("seeding")]
    Seeding,
}

impl TorrentState {
    /// Whether the consumer-facing read operations may proceed in this state.
    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            TorrentState::Downloading | TorrentState::Finished | TorrentState::Seeding
        )
    }
}

/// The byte range a file occupies within a single piece, as produced by [TorrentEngine::map_file].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceMapping {
    pub piece: u32,
    /// The byte offset within the piece where the mapped range starts.
    pub offset: u32,
    /// The number of bytes of the piece that belong to the mapped range.
    pub length: u32,
}

/// An alert popped from the engine's alert queue.
#[derive(Debug, Clone)]
pub enum EngineAlert {
    /// The torrent's lifecycle state changed.
    StateChanged(TorrentHandle, TorrentState),
    /// A piece finished downloading and was written to storage.
    PieceFinished(TorrentHandle, u32),
    /// The result of a previously requested deadline read.
    /// `data` is `None` on a transient read error.
    ReadPiece(TorrentHandle, u32, Option<Vec<u8>>),
    /// Metadata for a magnet-added torrent has been received from the swarm.
    MetadataReceived(TorrentHandle),
    /// The engine flushed resume data for the given torrent.
    SaveResumeData(TorrentHandle, Vec<u8>),
}

/// Engine-wide settings applied once at download start (see the engine configuration table).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub active_downloads: i32,
    pub active_seeds: i32,
    pub announce_to_all_trackers: bool,
    pub use_dht_as_fallback: bool,
    pub initial_picker_threshold: i32,
    pub no_atime_storage: bool,
    pub no_recheck_incomplete_resume: bool,
    pub max_queued_disk_bytes: i32,
    pub max_peerlist_size: i32,
    pub num_want: i32,
    pub torrent_connect_boost: i32,
    pub share_ratio_limit: f32,
    pub upload_rate_limit: i32,
    pub download_rate_limit: i32,
    pub user_agent: String,
    pub storage_mode: StorageMode,
    pub sequential_download: bool,
}

/// The operations this crate requires from the opaque BitTorrent protocol engine.
///
/// An implementation wraps the real protocol stack (peer wire protocol, piece hashing,
/// tracker/DHT traffic, bencode codec, extension plugins); this crate never reaches
/// past this trait into engine internals.
#[async_trait]
pub trait TorrentEngine: Debug + Send + Sync {
    /// Parse a magnet URI into add-parameters, extracting the info-hash and trackers.
    fn parse_magnet_uri(&self, uri: &str) -> Result<AddTorrentParams, String>;

    /// Parse the contents of a `.torrent` file into add-parameters with metadata embedded.
    fn parse_torrent_file(&self, bytes: &[u8]) -> Result<AddTorrentParams, String>;

    /// Add a torrent to the session and return its handle.
    async fn add_torrent(&self, params: AddTorrentParams) -> Result<TorrentHandle, String>;

    /// Remove a torrent from the session, optionally deleting its downloaded files.
    async fn remove_torrent(&self, handle: TorrentHandle, delete_files: bool);

    /// Wait up to `timeout` for at least one alert to become available.
    /// Returns `true` if alerts are available to pop, `false` on timeout.
    async fn wait_for_alert(&self, timeout: Duration) -> bool;

    /// Drain the currently available alerts.
    fn pop_alerts(&self) -> Vec<EngineAlert>;

    /// Apply the session-wide settings (see the engine configuration table).
    async fn set_settings(&self, settings: EngineSettings);

    /// Start the DHT subsystem.
    async fn start_dht(&self);

    /// Register a DHT bootstrap router.
    async fn add_dht_router(&self, host: &str, port: u16);

    /// Persist the DHT routing table and return the bencoded blob.
    async fn save_dht_state(&self) -> Vec<u8>;

    /// Restore the DHT routing table from a previously persisted blob.
    async fn load_dht_state(&self, state: &[u8]);

    /// Pause the given torrent.
    async fn pause(&self, handle: TorrentHandle);

    /// Ask the engine to flush resume data; completion is reported via
    /// [EngineAlert::SaveResumeData].
    async fn save_resume_data(&self, handle: TorrentHandle);

    /// Set the download priority (0 = skip, 7 = maximum) of a single piece.
    fn set_piece_priority(&self, handle: TorrentHandle, piece: u32, priority: u8);

    /// Request the engine to notify via [EngineAlert::ReadPiece] once the piece is available.
    fn set_piece_deadline(&self, handle: TorrentHandle, piece: u32, deadline_ms: u32);

    /// Enable or disable sequential (in-order) piece picking.
    fn set_sequential_download(&self, handle: TorrentHandle, sequential: bool);

    /// Query the current lifecycle state of the torrent.
    async fn status(&self, handle: TorrentHandle) -> TorrentState;

    /// Query the metadata of the torrent, if it is known yet.
    async fn torrent_info(&self, handle: TorrentHandle) -> Option<TorrentMetadata>;

    /// Map a byte offset within a file to the piece (and intra-piece range) that holds it.
    fn map_file(&self, handle: TorrentHandle, file_index: usize, file_offset: u64)
        -> PieceMapping;

    /// The engine's own name, reported as part of the `user_agent` sent to peers.
    fn name(&self) -> String;

    /// The engine's own version, reported as part of the `user_agent` sent to peers.
    fn version(&self) -> String;
}

#[cfg(any(test, feature = "testing"))]
pub use mock::*;

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        #[derive(Debug)]
        pub TorrentEngine {}

        #[async_trait]
        impl TorrentEngine for TorrentEngine {
            fn parse_magnet_uri(&self, uri: &str) -> Result<AddTorrentParams, String>;
            fn parse_torrent_file(&self, bytes: &[u8]) -> Result<AddTorrentParams, String>;
            async fn add_torrent(&self, params: AddTorrentParams) -> Result<TorrentHandle, String>;
            async fn remove_torrent(&self, handle: TorrentHandle, delete_files: bool);
            async fn wait_for_alert(&self, timeout: Duration) -> bool;
            fn pop_alerts(&self) -> Vec<EngineAlert>;
            async fn set_settings(&self, settings: EngineSettings);
            async fn start_dht(&self);
            async fn add_dht_router(&self, host: &str, port: u16);
            async fn save_dht_state(&self) -> Vec<u8>;
            async fn load_dht_state(&self, state: &[u8]);
            async fn pause(&self, handle: TorrentHandle);
            async fn save_resume_data(&self, handle: TorrentHandle);
            fn set_piece_priority(&self, handle: TorrentHandle, piece: u32, priority: u8);
            fn set_piece_deadline(&self, handle: TorrentHandle, piece: u32, deadline_ms: u32);
            fn set_sequential_download(&self, handle: TorrentHandle, sequential: bool);
            async fn status(&self, handle: TorrentHandle) -> TorrentState;
            async fn torrent_info(&self, handle: TorrentHandle) -> Option<TorrentMetadata>;
            fn map_file(&self, handle: TorrentHandle, file_index: usize, file_offset: u64) -> PieceMapping;
            fn name(&self) -> String;
            fn version(&self) -> String;
        }
    }
}
