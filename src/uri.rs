//! Translates a player-supplied location string into engine add-parameters.

use crate::engine::{AddTorrentParams, TorrentEngine};
use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use std::path::Path;

const MAGNET_PREFIX: &str = "magnet:?";
const TORRENT_SCHEME: &str = "torrent://";

/// Parses a location string into engine add-parameters.
///
/// The input may be percent-encoded. A `magnet:?` prefix is parsed through the engine's
/// magnet parser; anything else is treated as a `torrent://`-prefixed or plain filesystem
/// path to a `.torrent` file and loaded through the engine's torrent-file parser.
pub fn parse(location: &str, engine: &dyn TorrentEngine) -> Result<AddTorrentParams> {
    let decoded = percent_decode_str(location)
        .decode_utf8()
        .map_err(|e| Error::InvalidUri(e.to_string()))?
        .into_owned();

    if decoded.starts_with(MAGNET_PREFIX) {
        engine
            .parse_magnet_uri(&decoded)
            .map_err(Error::InvalidUri)
    } else {
        let path = decoded
            .strip_prefix(TORRENT_SCHEME)
            .unwrap_or(decoded.as_str());
        let bytes = std::fs::read(Path::new(path)).map_err(|e| Error::InvalidUri(e.to_string()))?;
        engine.parse_torrent_file(&bytes).map_err(Error::InvalidUri)
    }
}
