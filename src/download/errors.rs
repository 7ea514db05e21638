use crate::irc::IrcError;
use std::path::PathBuf;

/// Conditions that end the whole run. Everything recoverable is logged where it happens.
#[derive(Debug)]
pub enum DownloadError {
    IllegalFileName {
        name: String,
    },
    AlreadyDownloaded {
        path: PathBuf,
    },
    ExistingLarger {
        path: PathBuf,
        existing: u64,
        offered: u64,
    },
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    Transport(IrcError),
    TransferFailed {
        file_name: String,
        error: String,
    },
    SessionClosed {
        error: String,
    },
}

impl DownloadError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalFileName { name } => {
                write!(f, "refusing offered file name with path separators: '{name}'")
            }
            Self::AlreadyDownloaded { path } => {
                write!(f, "file '{}' is already completely downloaded", path.display())
            }
            Self::ExistingLarger {
                path,
                existing,
                offered,
            } => write!(
                f,
                "existing file '{}' ({existing} bytes) is larger than the offered size ({offered} bytes)",
                path.display()
            ),
            Self::Io { op, path, source } => {
                write!(f, "failed to {op} '{}': {source}", path.display())
            }
            Self::Transport(source) => write!(f, "transfer transport error: {source}"),
            Self::TransferFailed { file_name, error } => {
                write!(f, "could not start transfer of '{file_name}': {error}")
            }
            Self::SessionClosed { error } => write!(f, "IRC session closed: {error}"),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Transport(source) => Some(source),
            Self::IllegalFileName { .. }
            | Self::AlreadyDownloaded { .. }
            | Self::ExistingLarger { .. }
            | Self::TransferFailed { .. }
            | Self::SessionClosed { .. } => None,
        }
    }
}

impl From<IrcError> for DownloadError {
    fn from(value: IrcError) -> Self {
        Self::Transport(value)
    }
}
