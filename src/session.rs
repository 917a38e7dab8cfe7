//! Background task that pumps the engine's alert queue and dispatches each alert to the
//! piece controller, the status entity, or the cache store.

use crate::cache::CacheStore;
use crate::engine::{EngineAlert, TorrentEngine, TorrentHandle};
use crate::piece::PieceController;
use log::{debug, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How long the driver waits per poll iteration before checking the stop flag again.
const ALERT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// The long-running worker that owns the engine's event pump for a single torrent session.
#[derive(Debug)]
pub struct SessionDriver {
    engine: Arc<dyn TorrentEngine>,
    handle: TorrentHandle,
    controller: Arc<PieceController>,
    cache: Arc<CacheStore>,
    /// The torrent's info-hash, hex-encoded; the cache key resume blobs are saved under.
    info_hash_hex: String,
    cancellation_token: CancellationToken,
    /// Signalled once a `save-resume-data` alert has been observed and persisted.
    resume_saved: Arc<Notify>,
}

impl SessionDriver {
    pub fn new(
        engine: Arc<dyn TorrentEngine>,
        handle: TorrentHandle,
        controller: Arc<PieceController>,
        cache: Arc<CacheStore>,
        info_hash_hex: String,
    ) -> Self {
        Self {
            engine,
            handle,
            controller,
            cache,
            info_hash_hex,
            cancellation_token: CancellationToken::new(),
            resume_saved: Arc::new(Notify::new()),
        }
    }

    /// The token whose cancellation stops the driver at its next poll boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// A handle woken once the resume-data blob for this session has been persisted.
    pub fn resume_saved(&self) -> Arc<Notify> {
        self.resume_saved.clone()
    }

    /// Runs the dispatch loop until the cancellation token fires.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                has_alerts = self.engine.wait_for_alert(ALERT_POLL_TIMEOUT) => {
                    if has_alerts {
                        for alert in self.engine.pop_alerts() {
                            self.dispatch(alert).await;
                        }
                    }
                }
            }
            // `wait_for_alert` is free to return immediately (e.g. an engine reporting no
            // alerts without truly suspending); yield each pass so the loop cannot starve
            // the runtime of a chance to observe cancellation.
            tokio::task::yield_now().await;
        }
        debug!("Session driver for {} stopped", self.handle);
    }

    async fn dispatch(&self, alert: EngineAlert) {
        match alert {
            EngineAlert::StateChanged(handle, state) if handle == self.handle => {
                self.controller.status().set(state).await;
            }
            EngineAlert::PieceFinished(handle, piece) if handle == self.handle => {
                trace!("Piece {} finished for {}", piece, self.handle);
            }
            EngineAlert::ReadPiece(handle, piece, data) if handle == self.handle => {
                self.controller.on_read_piece(piece, data).await;
            }
            EngineAlert::SaveResumeData(handle, blob) if handle == self.handle => {
                let name = format!("{}.resume", self.info_hash_hex);
                self.cache.save(&name, &blob);
                self.resume_saved.notify_waiters();
            }
            EngineAlert::MetadataReceived(_) => {
                // only meaningful to the synchronous metadata-fetch pump, not this driver
            }
            _ => {
                // alert belongs to a different torrent handle than this driver owns
            }
        }
    }
}
