use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

/// A contiguous range within a single torrent piece that the consumer is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    /// The torrent piece index this entry belongs to.
    pub id: u32,
    /// The byte offset within the piece where the user-visible range starts.
    pub offset: u32,
    /// The number of bytes of the piece the consumer will receive.
    pub length: u32,
    /// Whether a deadline read has already been posted to the engine for this piece.
    pub requested: bool,
    /// The filled bytes, once the engine has delivered them. Exactly `length` bytes long.
    pub data: Option<Vec<u8>>,
}

impl Piece {
    /// A zero-length sentinel returned when no real piece is available yet.
    pub fn empty() -> Self {
        Self {
            id: 0,
            offset: 0,
            length: 0,
            requested: false,
            data: None,
        }
    }
}

/// An ordered, strictly-increasing-by-id sequence of [Piece] entries the [PieceController]
/// is currently interested in, guarded by a mutex and a paired [Notify].
#[derive(Debug, Default)]
pub struct PiecesQueue {
    pub(super) entries: Mutex<VecDeque<Piece>>,
    pub(super) notify: Notify,
}

impl PiecesQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of pieces currently enqueued.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the queue is currently empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_new_queue_is_empty() {
        let queue = PiecesQueue::new();

        assert!(queue.is_empty().await);
        assert_eq!(0, queue.len().await);
    }

    #[test]
    fn test_empty_piece() {
        let piece = Piece::empty();

        assert_eq!(0, piece.length);
        assert_eq!(None, piece.data);
    }
}
