//! Public entry point: the facade the embedding plugin shell opens and closes.

use crate::cache::CacheStore;
use crate::config::{TorrentStreamSettings, DHT_BOOTSTRAP_ROUTERS, DHT_STATE_FILE};
use crate::engine::{FileEntry, TorrentEngine, TorrentHandle, TorrentMetadata, TorrentState};
use crate::error::{Error, Result};
use crate::metadata;
use crate::piece::{Piece, PieceController, Status};
use crate::session::SessionDriver;
use crate::uri;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// How long `close` waits for the engine to flush resume data before giving up.
const RESUME_SAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridges a single opened torrent to the player: parses the location, drives metadata
/// acquisition, owns the piece controller and the background session driver, and tears
/// everything down again on close.
#[derive(Debug)]
pub struct TorrentAccess {
    engine: Arc<dyn TorrentEngine>,
    handle: TorrentHandle,
    controller: Arc<PieceController>,
    driver_handle: JoinHandle<()>,
    driver_token: tokio_util::sync::CancellationToken,
    resume_saved: Arc<Notify>,
    cache: Arc<CacheStore>,
    metadata: TorrentMetadata,
    info_hash_hex: String,
    selected_file: Mutex<Option<usize>>,
    keep_files: bool,
}

impl TorrentAccess {
    /// The player may pause playback at any time.
    pub const CAN_PAUSE: bool = true;
    /// The player may seek within the currently selected file.
    pub const CAN_SEEK: bool = true;
    /// Seeking is not accelerated; every seek pays the full piece-priority rebuild cost.
    pub const CAN_FAST_SEEK: bool = false;
    /// The player may influence download pace via rate limits.
    pub const CAN_CONTROL_PACE: bool = true;

    /// Opens `location` against `engine`, performing URI parsing, metadata acquisition
    /// (for magnet input), engine configuration, and spawning the Session Driver.
    pub async fn open(
        location: &str,
        engine: Arc<dyn TorrentEngine>,
        settings: TorrentStreamSettings,
    ) -> Result<Self> {
        let cache = Arc::new(CacheStore::new(settings.cache_dir.clone()));
        let params = uri::parse(location, engine.as_ref())?;

        let params = if params.has_torrent_metadata() {
            params
        } else {
            let (params, public_uri) = metadata::fetch(engine.as_ref(), &cache, params).await?;
            info!("Resolved magnet location to {}", public_uri);
            params
        };

        let mut params = params;
        params.save_path = settings.download_dir.clone().ok_or(Error::NoDownloadDir)?;
        let info_hash_hex = params.info_hash.to_hex();

        let user_agent = format!(
            "{}/{} {}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            engine.name(),
            engine.version(),
        );
        engine.set_settings(settings.engine_settings(user_agent)).await;

        let handle = engine
            .add_torrent(params.clone())
            .await
            .map_err(Self::map_add_torrent_error)?;

        engine.start_dht().await;
        for (host, port) in DHT_BOOTSTRAP_ROUTERS.iter().copied() {
            engine.add_dht_router(host, port).await;
        }

        let metadata = match params.torrent_info {
            Some(metadata) => metadata,
            None => {
                engine.remove_torrent(handle, true).await;
                return Err(Error::AddTorrentFailed(
                    "engine produced no torrent info after add".to_string(),
                ));
            }
        };

        let status = Arc::new(Status::new(TorrentState::QueuedForChecking));
        let controller = Arc::new(PieceController::new(engine.clone(), handle, status));
        let driver = SessionDriver::new(
            engine.clone(),
            handle,
            controller.clone(),
            cache.clone(),
            info_hash_hex.clone(),
        );
        let driver_token = driver.cancellation_token();
        let resume_saved = driver.resume_saved();
        let driver_handle = tokio::spawn(async move { driver.run().await });

        let access = Self {
            engine,
            handle,
            controller,
            driver_handle,
            driver_token,
            resume_saved,
            cache,
            metadata,
            info_hash_hex,
            selected_file: Mutex::new(None),
            keep_files: settings.keep_files,
        };

        if !settings.is_playlist() {
            access.select_file(settings.torrent_file_index as usize).await?;
        }

        Ok(access)
    }

    fn map_add_torrent_error(message: String) -> Error {
        if message.to_lowercase().contains("out of memory") {
            Error::OutOfMemory
        } else {
            Error::AddTorrentFailed(message)
        }
    }

    /// The torrent's files, sorted largest-first for playlist enumeration.
    pub fn files(&self) -> Vec<&FileEntry> {
        let mut files: Vec<&FileEntry> = self.metadata.files.iter().collect();
        files.sort_by_key(|f| std::cmp::Reverse(f.length));
        files
    }

    /// Selects `file_index` for streaming and primes the piece queue from its start.
    pub async fn select_file(&self, file_index: usize) -> Result<()> {
        if file_index >= self.metadata.files.len() {
            return Err(Error::InvalidArgument(format!(
                "file index {} does not exist",
                file_index
            )));
        }

        *self.selected_file.lock().await = Some(file_index);
        self.controller
            .select_pieces(file_index, 0, &self.metadata)
            .await;
        Ok(())
    }

    /// Re-selects the currently active file's pieces starting at `offset`, discarding any
    /// buffered data.
    pub async fn seek(&self, offset: u64) -> Result<()> {
        let file_index = self
            .selected_file
            .lock()
            .await
            .ok_or_else(|| Error::InvalidArgument("no file selected".to_string()))?;

        self.controller
            .select_pieces(file_index, offset, &self.metadata)
            .await;
        Ok(())
    }

    /// Returns the next block of bytes for the currently selected file.
    pub async fn read_next_block(&self) -> (Piece, bool) {
        self.controller.read_next_block().await
    }

    /// Runs the shutdown two-phase commit and joins the Session Driver.
    pub async fn close(self) {
        let dht_task = {
            let engine = self.engine.clone();
            tokio::spawn(async move { engine.save_dht_state().await })
        };

        if self.keep_files {
            self.engine.save_resume_data(self.handle).await;
            if tokio::time::timeout(RESUME_SAVE_TIMEOUT, self.resume_saved.notified())
                .await
                .is_err()
            {
                warn!("Timed out waiting for resume data for {}", self.handle);
            }
        }

        if let Ok(dht_state) = dht_task.await {
            self.cache.save(DHT_STATE_FILE, &dht_state);
        }

        self.engine.pause(self.handle).await;
        self.engine
            .remove_torrent(self.handle, !self.keep_files)
            .await;

        if !self.keep_files {
            self.cache.delete(&format!("{}.torrent", self.info_hash_hex));
            self.cache.delete(&format!("{}.resume", self.info_hash_hex));
        }

        self.driver_token.cancel();
        let _ = self.driver_handle.await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::{AddTorrentParams, InfoHash, MockTorrentEngine, PieceMapping, StorageMode};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn file_metadata() -> TorrentMetadata {
        TorrentMetadata {
            name: "movie".to_string(),
            piece_length: 256,
            num_pieces: 4,
            files: vec![
                FileEntry {
                    path: PathBuf::from("sample.txt"),
                    length: 10,
                    file_index: 0,
                },
                FileEntry {
                    path: PathBuf::from("movie.mp4"),
                    length: 900,
                    file_index: 1,
                },
            ],
        }
    }

    fn base_engine(metadata: TorrentMetadata) -> MockTorrentEngine {
        let mut engine = MockTorrentEngine::new();
        let metadata_for_parse = metadata.clone();
        engine.expect_parse_torrent_file().returning(move |_| {
            Ok(AddTorrentParams {
                info_hash: InfoHash([3u8; 20]),
                torrent_info: Some(metadata_for_parse.clone()),
                resume_data: None,
                trackers: vec![],
                save_path: PathBuf::from("/tmp"),
                storage_mode: StorageMode::Allocate,
            })
        });
        engine
            .expect_add_torrent()
            .returning(|_| Ok(fx_handle::Handle::new()));
        engine.expect_name().returning(|| "libtorrent".to_string());
        engine.expect_version().returning(|| "2.0".to_string());
        engine.expect_set_settings().returning(|_| ());
        engine.expect_start_dht().returning(|| ());
        engine.expect_add_dht_router().returning(|_, _| ());
        engine
            .expect_wait_for_alert()
            .returning(|_| false);
        engine.expect_pop_alerts().returning(Vec::new);
        engine.expect_save_resume_data().returning(|_| ());
        engine.expect_save_dht_state().returning(Vec::new);
        engine.expect_pause().returning(|_| ());
        engine.expect_remove_torrent().returning(|_, _| ());
        engine
    }

    fn torrent_file(dir: &std::path::Path) -> String {
        let path = dir.join("movie.torrent");
        std::fs::write(&path, b"d4:infod6:lengthi0eee").unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_open_requires_download_dir() {
        let dir = tempdir().unwrap();
        let location = torrent_file(dir.path());
        let engine = base_engine(file_metadata());

        let settings = TorrentStreamSettings {
            download_dir: None,
            ..TorrentStreamSettings::default()
        };

        let result = TorrentAccess::open(&location, Arc::new(engine), settings).await;

        assert_eq!(Error::NoDownloadDir, result.unwrap_err());
    }

    #[tokio::test]
    async fn test_open_selects_and_reads() {
        let dir = tempdir().unwrap();
        let location = torrent_file(dir.path());
        let mut engine = base_engine(file_metadata());
        engine.expect_set_piece_priority().returning(|_, _, _| ());
        engine.expect_map_file().returning(|_, _, offset| {
            let piece = (offset / 256) as u32;
            let intra = (offset % 256) as u32;
            PieceMapping {
                piece,
                offset: intra,
                length: 256 - intra,
            }
        });

        let settings = TorrentStreamSettings {
            download_dir: Some(dir.path().to_path_buf()),
            cache_dir: Some(dir.path().to_path_buf()),
            ..TorrentStreamSettings::default()
        };

        let access = TorrentAccess::open(&location, Arc::new(engine), settings)
            .await
            .expect("expected the torrent to open");

        let files = access.files();
        assert_eq!("movie.mp4", files[0].path.to_str().unwrap());

        access.select_file(1).await.expect("expected file to be selected");

        // the mock engine never reports a state change, so the status wait times out
        let (piece, eof) = access.read_next_block().await;
        assert!(!eof);
        assert_eq!(0, piece.length);

        access.close().await;
    }

    #[tokio::test]
    async fn test_select_file_rejects_out_of_range_index() {
        let dir = tempdir().unwrap();
        let location = torrent_file(dir.path());
        let engine = base_engine(file_metadata());

        let settings = TorrentStreamSettings {
            download_dir: Some(dir.path().to_path_buf()),
            cache_dir: Some(dir.path().to_path_buf()),
            ..TorrentStreamSettings::default()
        };

        let access = TorrentAccess::open(&location, Arc::new(engine), settings)
            .await
            .unwrap();

        let result = access.select_file(5).await;

        assert_eq!(
            Err(Error::InvalidArgument("file index 5 does not exist".to_string())),
            result
        );

        access.close().await;
    }
}
