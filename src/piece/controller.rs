use crate::engine::{TorrentEngine, TorrentHandle, TorrentMetadata};
use crate::piece::queue::{Piece, PiecesQueue};
use crate::piece::status::Status;
use log::trace;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Maximum engine piece priority: the piece is wanted as soon as possible.
const PRIORITY_MAX: u8 = 7;
/// Minimum engine piece priority: skip the piece entirely.
const PRIORITY_SKIP: u8 = 0;
/// How long `read_next_block` waits for the torrent to reach a readable state.
const STATE_WAIT: Duration = Duration::from_millis(500);
/// How long `read_next_block` waits for the head piece's bytes to arrive.
const BUFFER_WAIT: Duration = Duration::from_millis(500);

/// Owns the Pieces Queue and Status entity for a single torrent and reconciles the
/// player's block-oriented pull interface with the engine's piece-oriented delivery.
#[derive(Debug)]
pub struct PieceController {
    engine: Arc<dyn TorrentEngine>,
    handle: TorrentHandle,
    queue: PiecesQueue,
    status: Arc<Status>,
}

impl PieceController {
    pub fn new(engine: Arc<dyn TorrentEngine>, handle: TorrentHandle, status: Arc<Status>) -> Self {
        Self {
            engine,
            handle,
            queue: PiecesQueue::new(),
            status,
        }
    }

    /// The Status entity the Session Driver updates as engine alerts arrive.
    pub fn status(&self) -> &Arc<Status> {
        &self.status
    }

    /// (Re)computes which pieces of `metadata`'s `file_index` are of interest starting at
    /// `file_offset`, discarding any previously buffered data.
    pub async fn select_pieces(&self, file_index: usize, file_offset: u64, metadata: &TorrentMetadata) {
        let file = &metadata.files[file_index];

        for piece in 0..metadata.num_pieces {
            self.engine.set_piece_priority(self.handle, piece, PRIORITY_SKIP);
        }

        let mut pieces = VecDeque::new();
        let mut cursor = file_offset;
        while cursor < file.length {
            let mapping = self.engine.map_file(self.handle, file_index, cursor);
            self.engine
                .set_piece_priority(self.handle, mapping.piece, PRIORITY_MAX);

            let remaining = (file.length - cursor) as u32;
            let length = mapping.length.min(remaining);
            pieces.push_back(Piece {
                id: mapping.piece,
                offset: mapping.offset,
                length,
                requested: false,
                data: None,
            });
            cursor += length as u64;
        }

        trace!(
            "Selected {} pieces for file {} starting at offset {}",
            pieces.len(),
            file_index,
            file_offset
        );
        let mut guard = self.queue.entries.lock().await;
        *guard = pieces;
        drop(guard);
        self.queue.notify.notify_waiters();
    }

    /// Returns the next block of bytes in file order, or `(_, eof=true)` once the queue
    /// has been drained, or `(_, eof=false)` on a bounded-wait timeout the caller should retry.
    pub async fn read_next_block(&self) -> (Piece, bool) {
        if !self.status.wait_until_readable(STATE_WAIT).await {
            return (Piece::empty(), false);
        }

        let already_filled = {
            let mut guard = self.queue.entries.lock().await;
            let head = match guard.front_mut() {
                None => return (Piece::empty(), true),
                Some(head) => head,
            };

            if head.data.is_some() {
                true
            } else {
                if !head.requested {
                    head.requested = true;
                    let id = head.id;
                    drop(guard);
                    self.engine.set_piece_deadline(self.handle, id, 0);
                }
                false
            }
        };

        if !already_filled {
            let notified = self.queue.notify.notified();
            if tokio::time::timeout(BUFFER_WAIT, notified).await.is_err() {
                return (Piece::empty(), false);
            }
        }

        let mut guard = self.queue.entries.lock().await;
        match guard.front() {
            Some(head) if head.data.is_some() => (guard.pop_front().expect("front exists"), false),
            _ => (Piece::empty(), false),
        }
    }

    /// Handles a `read-piece` alert from the Session Driver.
    ///
    /// A missing buffer indicates a transient engine read error and is retried by reissuing
    /// the same deadline request. A piece that is no longer queued (dropped by a seek) or
    /// already filled (duplicate delivery) is silently ignored.
    pub async fn on_read_piece(&self, piece_id: u32, data: Option<Vec<u8>>) {
        let data = match data {
            None => {
                self.engine.set_piece_deadline(self.handle, piece_id, 0);
                return;
            }
            Some(data) => data,
        };

        let mut guard = self.queue.entries.lock().await;
        match guard.iter_mut().find(|p| p.id == piece_id) {
            None => {
                trace!("Piece {} is no longer wanted, dropping event", piece_id);
                return;
            }
            Some(piece) if piece.data.is_some() => return,
            Some(piece) => {
                let start = piece.offset as usize;
                let end = start + piece.length as usize;
                assert!(
                    data.len() >= end,
                    "engine returned fewer bytes than the piece's mapped range"
                );
                piece.data = Some(data[start..end].to_vec());
            }
        }

        let is_head = guard.front().map(|p| p.id == piece_id).unwrap_or(false);
        drop(guard);
        if is_head {
            self.queue.notify.notify_waiters();
        }
    }

    /// The number of pieces currently enqueued.
    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::{FileEntry, MockTorrentEngine, PieceMapping, TorrentState};
    use fx_handle::Handle;
    use std::path::PathBuf;

    fn metadata() -> TorrentMetadata {
        TorrentMetadata {
            name: "movie".to_string(),
            piece_length: 256,
            num_pieces: 4,
            files: vec![FileEntry {
                path: PathBuf::from("movie.mp4"),
                length: 900,
                file_index: 0,
            }],
        }
    }

    #[tokio::test]
    async fn test_select_pieces_enqueues_whole_file() {
        let mut engine = MockTorrentEngine::new();
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

        let handle = Handle::new();
        let status = Arc::new(Status::new(TorrentState::Downloading));
        let controller = PieceController::new(Arc::new(engine), handle, status);

        controller.select_pieces(0, 0, &metadata()).await;

        assert_eq!(4, controller.queue_len().await);
    }

    #[tokio::test]
    async fn test_select_pieces_from_offset_skips_leading_pieces() {
        let mut engine = MockTorrentEngine::new();
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

        let handle = Handle::new();
        let status = Arc::new(Status::new(TorrentState::Downloading));
        let controller = PieceController::new(Arc::new(engine), handle, status);

        controller.select_pieces(0, 300, &metadata()).await;

        // bytes [300, 900) span pieces 1..4 (300 falls inside piece 1)
        assert_eq!(3, controller.queue_len().await);
    }

    #[tokio::test]
    async fn test_select_pieces_at_file_end_is_empty() {
        let mut engine = MockTorrentEngine::new();
        engine.expect_set_piece_priority().returning(|_, _, _| ());

        let handle = Handle::new();
        let status = Arc::new(Status::new(TorrentState::Downloading));
        let controller = PieceController::new(Arc::new(engine), handle, status);

        controller.select_pieces(0, 900, &metadata()).await;

        assert_eq!(0, controller.queue_len().await);
    }

    #[tokio::test]
    async fn test_read_next_block_times_out_when_not_readable() {
        let engine = MockTorrentEngine::new();
        let handle = Handle::new();
        let status = Arc::new(Status::new(TorrentState::CheckingFiles));
        let controller = PieceController::new(Arc::new(engine), handle, status);

        let (piece, eof) = controller.read_next_block().await;

        assert_eq!(Piece::empty(), piece);
        assert!(!eof);
    }

    #[tokio::test]
    async fn test_read_next_block_reports_eof_on_empty_queue() {
        let engine = MockTorrentEngine::new();
        let handle = Handle::new();
        let status = Arc::new(Status::new(TorrentState::Downloading));
        let controller = PieceController::new(Arc::new(engine), handle, status);

        let (_, eof) = controller.read_next_block().await;

        assert!(eof);
    }

    #[tokio::test]
    async fn test_read_next_block_requests_and_delivers_head() {
        let mut engine = MockTorrentEngine::new();
        engine.expect_set_piece_priority().returning(|_, _, _| ());
        engine.expect_map_file().returning(|_, _, _| PieceMapping {
            piece: 0,
            offset: 0,
            length: 256,
        });
        engine
            .expect_set_piece_deadline()
            .withf(|_, piece, deadline| *piece == 0 && *deadline == 0)
            .times(1)
            .returning(|_, _, _| ());

        let handle = Handle::new();
        let status = Arc::new(Status::new(TorrentState::Downloading));
        let controller = Arc::new(PieceController::new(Arc::new(engine), handle, status));
        controller
            .select_pieces(
                0,
                0,
                &TorrentMetadata {
                    name: "movie".to_string(),
                    piece_length: 256,
                    num_pieces: 1,
                    files: vec![FileEntry {
                        path: PathBuf::from("movie.mp4"),
                        length: 256,
                        file_index: 0,
                    }],
                },
            )
            .await;

        let filler = controller.clone();
        let fill = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            filler.on_read_piece(0, Some(vec![7u8; 256])).await;
        });

        let (piece, eof) = controller.read_next_block().await;
        fill.await.unwrap();

        assert!(!eof);
        assert_eq!(vec![7u8; 256], piece.data.unwrap());
    }

    #[tokio::test]
    async fn test_on_read_piece_ignores_unknown_id() {
        let engine = MockTorrentEngine::new();
        let handle = Handle::new();
        let status = Arc::new(Status::new(TorrentState::Downloading));
        let controller = PieceController::new(Arc::new(engine), handle, status);

        controller.on_read_piece(42, Some(vec![1, 2, 3])).await;

        assert_eq!(0, controller.queue_len().await);
    }

    #[tokio::test]
    async fn test_on_read_piece_reissues_on_read_error() {
        let mut engine = MockTorrentEngine::new();
        engine
            .expect_set_piece_deadline()
            .withf(|_, piece, _| *piece == 3)
            .times(1)
            .returning(|_, _, _| ());

        let handle = Handle::new();
        let status = Arc::new(Status::new(TorrentState::Downloading));
        let controller = PieceController::new(Arc::new(engine), handle, status);

        controller.on_read_piece(3, None).await;
    }
}
