//! Host-supplied configuration for a [crate::access::TorrentAccess] session.

use crate::engine::{EngineSettings, StorageMode};
use derive_more::Display;
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The name of the persisted DHT routing table, under the cache directory.
pub const DHT_STATE_FILE: &str = "dht_state.dat";

const DEFAULT_TORRENT_FILE_INDEX: fn() -> i32 = || -1;
const DEFAULT_KEEP_FILES: fn() -> bool = || true;
const DEFAULT_RATE_LIMIT: fn() -> u32 = || 0;
const DEFAULT_SHARE_RATIO_LIMIT: fn() -> f32 = || 2.0;
const DEFAULT_DOWNLOAD_DIRECTORY: fn() -> Option<PathBuf> = || {
    UserDirs::new()
        .and_then(|e| e.download_dir().map(PathBuf::from))
};
const DEFAULT_CACHE_DIRECTORY: fn() -> Option<PathBuf> = || {
    ProjectDirs::from("org", "popcorn-time", "torrent-stream")
        .map(|dirs| dirs.cache_dir().to_path_buf())
};

/// The number of simultaneous active downloads/seeds the engine is configured with.
const ACTIVE_DOWNLOADS: i32 = 1;
const ACTIVE_SEEDS: i32 = 1;
const MAX_QUEUED_DISK_BYTES: i32 = 2 * 1024 * 1024;
const MAX_PEERLIST_SIZE: i32 = 3000;
const NUM_WANT: i32 = 200;

/// The DHT bootstrap routers used at startup.
pub const DHT_BOOTSTRAP_ROUTERS: &[(&str, u16)] = &[
    ("router.bittorrent.com", 6881),
    ("router.utorrent.com", 6881),
    ("router.bitcomet.com", 6881),
];

/// The configuration consumed from the host player for a single torrent session.
#[derive(Debug, Display, Clone, Serialize, Deserialize, PartialEq)]
#[display("torrent-file-index: {torrent_file_index}, download-dir: {download_dir:?}")]
pub struct TorrentStreamSettings {
    /// A negative value enumerates the torrent's files as a playlist; otherwise the index
    /// of the single file to stream.
    #[serde(default = "DEFAULT_TORRENT_FILE_INDEX")]
    pub torrent_file_index: i32,
    /// The directory downloaded files are saved into.
    #[serde(default = "DEFAULT_DOWNLOAD_DIRECTORY")]
    pub download_dir: Option<PathBuf>,
    /// The directory cached torrent bodies, resume blobs and DHT state are persisted under.
    #[serde(default = "DEFAULT_CACHE_DIRECTORY")]
    pub cache_dir: Option<PathBuf>,
    /// Whether downloaded files and resume data are retained on shutdown.
    #[serde(default = "DEFAULT_KEEP_FILES")]
    pub keep_files: bool,
    /// Upload rate limit, in kB/s. Zero means unlimited.
    #[serde(default = "DEFAULT_RATE_LIMIT")]
    pub upload_rate_limit: u32,
    /// Download rate limit, in kB/s. Zero means unlimited.
    #[serde(default = "DEFAULT_RATE_LIMIT")]
    pub download_rate_limit: u32,
    /// The share ratio at which the engine should stop seeding.
    #[serde(default = "DEFAULT_SHARE_RATIO_LIMIT")]
    pub share_ratio_limit: f32,
}

impl TorrentStreamSettings {
    /// Whether `torrent_file_index` requests playlist enumeration rather than a single file.
    pub fn is_playlist(&self) -> bool {
        self.torrent_file_index < 0
    }

    /// Builds the engine-wide settings map applied at download start from this configuration.
    pub fn engine_settings(&self, user_agent: String) -> EngineSettings {
        EngineSettings {
            active_downloads: ACTIVE_DOWNLOADS,
            active_seeds: ACTIVE_SEEDS,
            announce_to_all_trackers: true,
            use_dht_as_fallback: false,
            initial_picker_threshold: 0,
            no_atime_storage: true,
            no_recheck_incomplete_resume: true,
            max_queued_disk_bytes: MAX_QUEUED_DISK_BYTES,
            max_peerlist_size: MAX_PEERLIST_SIZE,
            num_want: NUM_WANT,
            torrent_connect_boost: NUM_WANT / 10,
            share_ratio_limit: self.share_ratio_limit,
            upload_rate_limit: (self.upload_rate_limit as i32) * 1024,
            download_rate_limit: (self.download_rate_limit as i32) * 1024,
            user_agent,
            storage_mode: StorageMode::Allocate,
            sequential_download: true,
        }
    }
}

impl Default for TorrentStreamSettings {
    fn default() -> Self {
        Self {
            torrent_file_index: DEFAULT_TORRENT_FILE_INDEX(),
            download_dir: DEFAULT_DOWNLOAD_DIRECTORY(),
            cache_dir: DEFAULT_CACHE_DIRECTORY(),
            keep_files: DEFAULT_KEEP_FILES(),
            upload_rate_limit: DEFAULT_RATE_LIMIT(),
            download_rate_limit: DEFAULT_RATE_LIMIT(),
            share_ratio_limit: DEFAULT_SHARE_RATIO_LIMIT(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_playlist() {
        let settings = TorrentStreamSettings::default();

        assert!(settings.is_playlist());
        assert!(settings.keep_files);
    }

    #[test]
    fn test_engine_settings_applies_rate_limit_in_bytes() {
        let settings = TorrentStreamSettings {
            upload_rate_limit: 50,
            download_rate_limit: 100,
            ..TorrentStreamSettings::default()
        };

        let result = settings.engine_settings("test/1.0".to_string());

        assert_eq!(50 * 1024, result.upload_rate_limit);
        assert_eq!(100 * 1024, result.download_rate_limit);
        assert!(result.sequential_download);
        assert_eq!(StorageMode::Allocate, result.storage_mode);
    }
}
