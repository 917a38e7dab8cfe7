//! Bridges an opaque BitTorrent protocol engine to a media player that pulls file bytes
//! on demand, by prioritizing and sequencing the pieces the player is about to read.

pub mod access;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod piece;
pub mod session;
pub mod uri;

pub use access::TorrentAccess;
pub use error::{Error, Result};
