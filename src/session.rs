//! Seams between the transfer orchestrator and the outside world.
//!
//! The orchestrator never talks to sockets directly. It reacts to [`SessionEvent`]s delivered
//! on a single channel and drives the chat session, the DCC transport and the checksum workers
//! through the traits below. The IRC adapter in [`crate::irc`] provides the production
//! implementations; tests provide recording fakes.

use crate::checksum::ChecksumTask;
use crate::irc::IrcError;
use std::fmt;
use std::net::IpAddr;

/// Index of a transfer slot in the download registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub usize);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A peer announcing that it is ready to send us a named file (`DCC SEND`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DccOffer {
    /// Nick of the offering peer; resume requests are addressed to it.
    pub nick: String,
    pub file_name: String,
    pub addr: IpAddr,
    pub port: u16,
    pub size: u64,
}

/// Terminal or data status for one inbound read on a DCC socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Data(Vec<u8>),
    /// The transport gave up on this transfer mid-stream.
    Failed(String),
}

/// Everything the control loop can observe, one variant per event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Registration with the server finished.
    Connected,
    /// We joined a channel.
    Joined {
        channel: String,
    },
    /// Our own user modes changed (e.g. `+r` after identifying).
    UserMode {
        mode: String,
    },
    /// A channel mode changed (e.g. `+v` granted).
    ChannelMode {
        channel: String,
        mode: String,
        args: Vec<String>,
    },
    Notice {
        origin: Option<String>,
        target: String,
        text: String,
    },
    PrivateMessage {
        origin: Option<String>,
        target: String,
        text: String,
    },
    Numeric {
        code: u16,
        params: Vec<String>,
    },
    Raw {
        command: String,
        origin: Option<String>,
        params: Vec<String>,
    },
    FileOffer(DccOffer),
    /// The peer acknowledged a `DCC RESUME` request.
    ResumeAccepted {
        nick: String,
        file_name: String,
        port: u16,
        position: u64,
    },
    /// Could not establish the DCC connection for an accepted offer.
    AcceptFailed {
        id: TransferId,
        error: String,
    },
    Transfer {
        id: TransferId,
        chunk: ChunkStatus,
    },
    /// The session is gone. `error` is set when it ended on an I/O failure.
    Closed {
        error: Option<String>,
    },
}

/// Outbound side of the chat session.
///
/// Implementations must not block: the production handle only queues lines for a writer task.
pub trait ChatSession {
    fn send_message(&mut self, target: &str, text: &str) -> Result<(), IrcError>;
    fn join(&mut self, channel: &str) -> Result<(), IrcError>;
    fn request_user_mode(&mut self, flags: &str) -> Result<(), IrcError>;
    fn disconnect(&mut self, reason: &str) -> Result<(), IrcError>;
    fn is_connected(&self) -> bool;
}

/// Raw DCC socket operations.
///
/// `accept` starts streaming; chunks come back as [`SessionEvent::Transfer`] tagged with `id`.
pub trait DccTransport {
    fn accept(&mut self, id: TransferId, offer: &DccOffer, start_at: u64) -> Result<(), IrcError>;
    fn request_resume(&mut self, offer: &DccOffer, position: u64) -> Result<(), IrcError>;
}

/// Launches fire-and-forget checksum verification. Ownership of the task moves to the worker.
pub trait VerificationSpawner {
    fn spawn_verification(&mut self, task: ChecksumTask);
}
