use thiserror::Error;

/// Process table enumeration failed for this tick.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("process table is empty")]
    EmptyTable,
}

/// The OS could not tell us which window has focus (or what it is called).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ForegroundError {
    #[error("foreground window unavailable: {0}")]
    Unavailable(String),

    #[error("no visible window for pid {0}")]
    NoWindow(u32),
}

#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("cannot read history log {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("marker {0} not found in history log")]
    MissingMarker(&'static str),

    #[error("value after {0} is not a terminated string")]
    Unterminated(&'static str),

    #[error("value after {0} is empty")]
    EmptyValue(&'static str),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0} is tracked through its history log and cannot be registered")]
    EmulatorReserved(String),

    #[error("process name must not be empty")]
    EmptyProcessName,

    #[error("failed to persist templates: {0}")]
    Persist(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("thumbnail data is not a base64 data URL")]
    InvalidDataUrl,

    #[error("thumbnail base64 payload is invalid: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("thumbnail name {0:?} is not a plain file name")]
    InvalidName(String),

    #[error("unknown image type {0:?}")]
    UnknownKind(String),

    #[error("thumbnail i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a poll tick was skipped. The previous state is kept in every case.
#[derive(Error, Debug)]
pub enum TickError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Foreground(#[from] ForegroundError),

    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    #[error("{0} timed out after {1} ms")]
    TimedOut(&'static str, u128),

    #[error("{0} task failed: {1}")]
    Join(&'static str, String),
}
