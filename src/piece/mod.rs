//! Reconciles the block-oriented, seekable pull interface the player expects with the
//! piece-oriented, out-of-order delivery of the torrent engine.

mod controller;
mod queue;
mod status;

pub use controller::PieceController;
pub use queue::{Piece, PiecesQueue};
pub use status::Status;
