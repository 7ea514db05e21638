use std::fmt;
use std::time::Duration;

/// Errors from the IRC session adapter and the DCC sockets it opens.
///
/// Pattern:
/// - Line-protocol and socket code returns `IrcError` (typed).
/// - The orchestrator maps transport failures into `DownloadError::Transport` when they are
///   fatal, and only logs them otherwise.
#[derive(Debug)]
pub enum IrcError {
    /// The session (or a DCC socket) was closed by the remote side.
    Closed,

    /// A read/write operation exceeded the configured timeout.
    Timeout { op: String, dur: Duration },

    /// Underlying I/O error.
    Io { op: String, source: std::io::Error },

    /// The server or peer sent a syntactically invalid line.
    BadFrame { what: &'static str, raw: String },

    /// A caller asked for something the protocol cannot express (e.g. passive DCC).
    Protocol { what: String },

    /// The outbound command queue is gone; the writer task has stopped.
    QueueClosed,
}

impl IrcError {
    pub fn io(op: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            op: op.into(),
            source,
        }
    }

    pub fn timeout(op: impl Into<String>, dur: Duration) -> Self {
        Self::Timeout { op: op.into(), dur }
    }

    pub fn protocol(what: impl Into<String>) -> Self {
        Self::Protocol { what: what.into() }
    }
}

impl fmt::Display for IrcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrcError::Closed => write!(f, "connection closed by peer"),
            IrcError::Timeout { op, dur } => write!(f, "{op} timed out after {dur:?}"),
            IrcError::Io { op, source } => write!(f, "{op} I/O error: {source}"),
            IrcError::BadFrame { what, raw } => write!(f, "bad IRC line ({what}): {raw}"),
            IrcError::Protocol { what } => write!(f, "IRC protocol error: {what}"),
            IrcError::QueueClosed => write!(f, "IRC command queue closed"),
        }
    }
}

impl std::error::Error for IrcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IrcError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
