use thiserror::Error;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can be surfaced by opening, streaming or closing a [crate::access::TorrentAccess].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The given location could not be parsed into engine add-parameters.
    #[error("invalid uri: {0}")]
    InvalidUri(String),
    /// No usable save path could be determined for the download.
    #[error("no download directory configured")]
    NoDownloadDir,
    /// Metadata for a magnet link could not be obtained or cached.
    #[error("failed to fetch torrent metadata: {0}")]
    MetadataFailed(String),
    /// The engine rejected the add-parameters at download start.
    #[error("failed to add torrent: {0}")]
    AddTorrentFailed(String),
    /// The host allocator ran out of memory while opening the torrent.
    #[error("out of memory")]
    OutOfMemory,
    /// The requested file index does not exist within the torrent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
