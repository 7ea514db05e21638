//! DCC SEND receiving side.
//!
//! Each accepted offer gets its own task that connects to the peer, forwards every chunk to
//! the control loop as a [`SessionEvent::Transfer`] and acknowledges the running byte count.
//! The task never touches the file; writing is the orchestrator's job. Chunks travel over a
//! bounded queue, so a task stops reading from the peer while the control loop is behind.

use crate::irc::client::IrcHandle;
use crate::irc::ctcp::{dcc_resume_body, wrap_ctcp};
use crate::irc::IrcError;
use crate::session::{ChatSession, ChunkStatus, DccOffer, DccTransport, SessionEvent, TransferId};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    time::{Duration, timeout},
};

type Result<T> = std::result::Result<T, IrcError>;

const READ_BUF_LEN: usize = 64 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the transfer event queue, in chunks.
pub const TRANSFER_QUEUE_LEN: usize = 32;

/// Production [`DccTransport`]: resume requests go out over the chat session, accepted offers
/// are streamed by spawned tasks.
pub struct DccConnector {
    session: IrcHandle,
    events: mpsc::Sender<SessionEvent>,
    idle_timeout: Option<Duration>,
}

impl DccConnector {
    pub fn new(
        session: IrcHandle,
        events: mpsc::Sender<SessionEvent>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            session,
            events,
            idle_timeout,
        }
    }
}

impl DccTransport for DccConnector {
    fn accept(&mut self, id: TransferId, offer: &DccOffer, start_at: u64) -> Result<()> {
        if offer.port == 0 {
            return Err(IrcError::protocol(format!(
                "passive DCC offer for '{}' is not supported",
                offer.file_name
            )));
        }
        if start_at > offer.size {
            return Err(IrcError::protocol(format!(
                "resume position {start_at} is beyond the offered size {}",
                offer.size
            )));
        }

        let addr = SocketAddr::new(offer.addr, offer.port);
        let events = self.events.clone();
        let idle_timeout = self.idle_timeout;
        let size = offer.size;
        tracing::debug!(transfer = %id, %addr, start_at, size, "accepting DCC offer");

        tokio::spawn(async move {
            let stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    let _ = events
                        .send(SessionEvent::AcceptFailed {
                            id,
                            error: IrcError::io(format!("connect {addr}"), e).to_string(),
                        })
                        .await;
                    return;
                }
                Err(_) => {
                    let _ = events
                        .send(SessionEvent::AcceptFailed {
                            id,
                            error: IrcError::timeout(format!("connect {addr}"), CONNECT_TIMEOUT)
                                .to_string(),
                        })
                        .await;
                    return;
                }
            };
            stream_chunks(stream, id, start_at, size, idle_timeout, &events).await;
        });
        Ok(())
    }

    fn request_resume(&mut self, offer: &DccOffer, position: u64) -> Result<()> {
        let body = dcc_resume_body(offer, position);
        tracing::info!(peer = %offer.nick, request = %body, "requesting DCC resume");
        self.session.send_message(&offer.nick, &wrap_ctcp(&body))
    }
}

/// Read the remaining `size - start_at` bytes from `stream`, forwarding chunks and acking.
///
/// Ends with exactly one terminal outcome: the last data chunk, or a `Failed` status. Each
/// chunk is queued before it is acked; a full queue pauses reading.
pub(crate) async fn stream_chunks<S>(
    mut stream: S,
    id: TransferId,
    start_at: u64,
    size: u64,
    idle_timeout: Option<Duration>,
    events: &mpsc::Sender<SessionEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut position = start_at;
    let mut buf = vec![0u8; READ_BUF_LEN];

    while position < size {
        let want = usize::try_from(size - position)
            .unwrap_or(READ_BUF_LEN)
            .min(READ_BUF_LEN);

        let n = match read_some(&mut stream, &mut buf[..want], idle_timeout).await {
            Ok(n) => n,
            Err(err) => {
                let _ = events
                    .send(SessionEvent::Transfer {
                        id,
                        chunk: ChunkStatus::Failed(err.to_string()),
                    })
                    .await;
                return;
            }
        };

        position += n as u64;
        if events
            .send(SessionEvent::Transfer {
                id,
                chunk: ChunkStatus::Data(buf[..n].to_vec()),
            })
            .await
            .is_err()
        {
            return;
        }

        // Acks are the low 32 bits of the absolute position, big-endian.
        let ack = (position as u32).to_be_bytes();
        if let Err(e) = stream.write_all(&ack).await {
            if position < size {
                let _ = events
                    .send(SessionEvent::Transfer {
                        id,
                        chunk: ChunkStatus::Failed(IrcError::io("send DCC ack", e).to_string()),
                    })
                    .await;
                return;
            }
            // Some senders hang up as soon as the last byte is out.
            tracing::debug!(transfer = %id, error = %e, "final DCC ack not delivered");
        }
    }

    let _ = stream.shutdown().await;
    tracing::debug!(transfer = %id, "DCC stream finished");
}

async fn read_some<S>(stream: &mut S, buf: &mut [u8], idle_timeout: Option<Duration>) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    let read = async {
        let n = stream
            .read(buf)
            .await
            .map_err(|e| IrcError::io("read DCC stream", e))?;
        if n == 0 {
            return Err(IrcError::Closed);
        }
        Ok(n)
    };
    match idle_timeout {
        Some(dur) => match timeout(dur, read).await {
            Ok(r) => r,
            Err(_) => Err(IrcError::timeout("DCC read", dur)),
        },
        None => read.await,
    }
}
