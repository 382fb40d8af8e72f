//! Platform-specific directories for the `beam` binary.

use std::path::PathBuf;

/// Log directory.
///
/// - macOS: `~/Library/Caches/beam/logs`
/// - Linux: `~/.cache/beam/logs` (or `$XDG_CACHE_HOME/beam/logs`)
/// - Windows: `%LOCALAPPDATA%\beam\cache\logs`
/// - Fallback: `/tmp/beam/logs`
pub fn log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "beam")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp/beam"))
        .join("logs")
}

/// Directory holding the signing key and cached session.
///
/// `BEAM_DATA_DIR` overrides the platform default.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("BEAM_DATA_DIR") {
        return PathBuf::from(dir);
    }
    directories::ProjectDirs::from("", "", "beam")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./beam_data"))
}
