use std::path::PathBuf;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "PORTICO_DATA_DIR";

/// Root data directory for Portico.
///
/// Holds the status store, workspace registry and logs. The proxy and
/// certificate directories are configured separately because they usually
/// live under system paths owned by nginx and certbot.
///
/// - `$PORTICO_DATA_DIR` when set
/// - Linux: `~/.portico/`
/// - macOS: `~/Library/Application Support/portico/`
/// - Windows: `%LOCALAPPDATA%\portico\`
pub fn portico_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("portico");
        }
    }

    #[cfg(windows)]
    {
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(local).join("portico");
        }
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".portico");
        }
    }

    // Fallback
    PathBuf::from(".portico")
}

/// Runtime state directory (status store, workspace registry).
pub fn portico_state_dir() -> PathBuf {
    portico_data_dir().join("state")
}

/// Log directory.
pub fn portico_log_dir() -> PathBuf {
    portico_data_dir().join("logs")
}
