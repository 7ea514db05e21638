use crate::config::AddressFamily;
use crate::irc::IrcError;
use crate::irc::ctcp::{DccMessage, ctcp_body, parse_dcc};
use crate::irc::protocol::{IrcCommand, IrcMessage};
use crate::session::{ChatSession, SessionEvent};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpStream, lookup_host},
    sync::mpsc,
    task::JoinHandle,
    time::{Duration, timeout},
};

type Result<T> = std::result::Result<T, IrcError>;

pub(crate) const MAX_IRC_LINE_LEN: usize = 8 * 1024;

const RPL_WELCOME: u16 = 1;
const ERR_NICKNAMEINUSE: u16 = 433;

/// Cheap, cloneable outbound side of a session.
///
/// Commands are queued for the writer task, so nothing here ever awaits the socket.
#[derive(Debug, Clone)]
pub struct IrcHandle {
    tx: mpsc::UnboundedSender<String>,
    nick: Arc<Mutex<String>>,
    connected: Arc<AtomicBool>,
}

impl IrcHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<String>, nick: &str) -> Self {
        Self {
            tx,
            nick: Arc::new(Mutex::new(nick.to_string())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn send_command(&self, cmd: IrcCommand) -> Result<()> {
        let line = cmd.to_line();
        tracing::debug!(line = %line, "IRC ->");
        self.tx.send(line).map_err(|_| IrcError::QueueClosed)
    }

    /// Our current nick as acknowledged by the server.
    pub fn nick(&self) -> String {
        match self.nick.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_nick(&self, nick: &str) {
        let mut guard = match self.nick.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = nick.to_string();
    }

    fn is_own_nick(&self, nick: &str) -> bool {
        self.nick().eq_ignore_ascii_case(nick)
    }

    fn mark_closed(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

impl ChatSession for IrcHandle {
    fn send_message(&mut self, target: &str, text: &str) -> Result<()> {
        self.send_command(IrcCommand::new("PRIVMSG").arg(target).trailing(text))
    }

    fn join(&mut self, channel: &str) -> Result<()> {
        self.send_command(IrcCommand::new("JOIN").arg(channel))
    }

    fn request_user_mode(&mut self, flags: &str) -> Result<()> {
        let nick = self.nick();
        self.send_command(IrcCommand::new("MODE").arg(nick).arg(flags))
    }

    fn disconnect(&mut self, reason: &str) -> Result<()> {
        self.send_command(IrcCommand::new("QUIT").trailing(reason))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// A registered (or registering) IRC connection with its reader and writer tasks.
pub struct IrcSession {
    handle: IrcHandle,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl IrcSession {
    /// Connect, start the I/O tasks and send `NICK`/`USER`.
    ///
    /// Parsed events are delivered on `events`; the last one is always [`SessionEvent::Closed`].
    pub async fn connect(
        server: &str,
        port: u16,
        nick: &str,
        family: AddressFamily,
        io_timeout: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let stream = connect_tcp(server, port, family).await?;
        let peer = stream
            .peer_addr()
            .map_err(|e| IrcError::io("read peer address", e))?;
        tracing::info!(server, %peer, nick, "connected to IRC server");

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = IrcHandle::new(tx, nick);

        handle.send_command(IrcCommand::new("NICK").arg(nick))?;
        handle.send_command(
            IrcCommand::new("USER")
                .arg(nick)
                .arg("0")
                .arg("*")
                .trailing(nick),
        )?;

        let writer = tokio::spawn(run_writer(write_half, rx, io_timeout));
        let reader = tokio::spawn(run_reader(
            BufReader::new(read_half),
            handle.clone(),
            events,
        ));

        Ok(Self {
            handle,
            reader,
            writer,
        })
    }

    pub fn handle(&self) -> IrcHandle {
        self.handle.clone()
    }

    /// Stop both I/O tasks. Queued but unsent lines are dropped.
    pub async fn shutdown(self) {
        self.handle.mark_closed();
        self.reader.abort();
        self.writer.abort();
        let _ = self.reader.await;
        let _ = self.writer.await;
        tracing::debug!("IRC session tasks stopped");
    }
}

async fn connect_tcp(server: &str, port: u16, family: AddressFamily) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = lookup_host((server, port))
        .await
        .map_err(|e| IrcError::io(format!("resolve {server}"), e))?
        .filter(|a| family.allows(a))
        .collect();

    if addrs.is_empty() {
        return Err(IrcError::protocol(format!(
            "{server} has no {family} address"
        )));
    }

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(IrcError::io(format!("connect {addr}"), e));
            }
        }
    }
    Err(last_err.unwrap_or(IrcError::Closed))
}

pub(crate) async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
    io_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let quitting = line.starts_with("QUIT");
        if let Err(err) = send_line_crlf(&mut writer, &line, io_timeout).await {
            tracing::warn!(error = %err, "IRC write failed; stopping writer");
            break;
        }
        if quitting {
            // Half-close: the server answers QUIT with ERROR and drops the link.
            let _ = writer.shutdown().await;
            break;
        }
    }
}

async fn send_line_crlf<W>(writer: &mut W, line: &str, io_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = format!("{line}\r\n");
    match timeout(io_timeout, async {
        writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| IrcError::io("write line", e))?;
        writer
            .flush()
            .await
            .map_err(|e| IrcError::io("flush line", e))?;
        Ok::<(), IrcError>(())
    })
    .await
    {
        Ok(r) => r,
        Err(_) => Err(IrcError::timeout("write line", io_timeout)),
    }
}

pub(crate) async fn run_reader<R>(
    mut reader: R,
    handle: IrcHandle,
    events: mpsc::UnboundedSender<SessionEvent>,
) where
    R: AsyncBufRead + Unpin,
{
    let error = loop {
        let line = match read_line_capped(&mut reader).await {
            Ok(line) => line,
            Err(IrcError::Closed) => break None,
            Err(err @ IrcError::BadFrame { .. }) => {
                tracing::warn!(error = %err, "dropping IRC line");
                continue;
            }
            Err(err) => break Some(err.to_string()),
        };
        if line.is_empty() {
            continue;
        }
        tracing::trace!(raw = %line, "IRC <-");

        let msg = match IrcMessage::parse(&line) {
            Ok(msg) => msg,
            Err(err) => {
                tracing::warn!(error = %err, "unparseable IRC line");
                continue;
            }
        };

        if let Some(ev) = dispatch(&handle, &msg)
            && events.send(ev).is_err()
        {
            break None;
        }
    };

    handle.mark_closed();
    let _ = events.send(SessionEvent::Closed { error });
}

async fn read_line_capped<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|e| IrcError::io("read line", e))?;
    if n == 0 {
        return Err(IrcError::Closed);
    }
    decode_line_bytes(buf)
}

fn decode_line_bytes(mut bytes: Vec<u8>) -> Result<String> {
    if bytes.len() > MAX_IRC_LINE_LEN {
        return Err(IrcError::BadFrame {
            what: "line too long",
            raw: format!("len={}", bytes.len()),
        });
    }
    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }
    // Servers relay whatever encoding clients used; never fail on it.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Answer keepalives and translate one inbound message into a session event.
pub(crate) fn dispatch(handle: &IrcHandle, msg: &IrcMessage) -> Option<SessionEvent> {
    let origin = msg.nick().map(str::to_string);

    match msg.command.as_str() {
        "PING" => {
            let token = msg.param(0).unwrap_or_default();
            if let Err(err) = handle.send_command(IrcCommand::new("PONG").trailing(token)) {
                tracing::warn!(error = %err, "failed to answer PING");
            }
            None
        }
        "NICK" => {
            if let (Some(old), Some(new)) = (msg.nick(), msg.param(0))
                && handle.is_own_nick(old)
            {
                handle.set_nick(new);
                tracing::info!(nick = new, "nick changed");
            }
            None
        }
        "JOIN" => {
            let channel = msg.param(0)?;
            if msg.nick().is_some_and(|n| handle.is_own_nick(n)) {
                Some(SessionEvent::Joined {
                    channel: channel.to_string(),
                })
            } else {
                None
            }
        }
        "MODE" => {
            let target = msg.param(0)?;
            let mode = msg.param(1).unwrap_or_default().to_string();
            if handle.is_own_nick(target) {
                Some(SessionEvent::UserMode { mode })
            } else {
                Some(SessionEvent::ChannelMode {
                    channel: target.to_string(),
                    mode,
                    args: msg.params.iter().skip(2).cloned().collect(),
                })
            }
        }
        "NOTICE" => Some(SessionEvent::Notice {
            origin,
            target: msg.param(0).unwrap_or_default().to_string(),
            text: msg.param(1).unwrap_or_default().to_string(),
        }),
        "PRIVMSG" => {
            let target = msg.param(0).unwrap_or_default().to_string();
            let text = msg.param(1).unwrap_or_default();
            if let Some(body) = ctcp_body(text) {
                match parse_dcc(origin.as_deref().unwrap_or_default(), body) {
                    Ok(Some(DccMessage::Send(offer))) => return Some(SessionEvent::FileOffer(offer)),
                    Ok(Some(DccMessage::Accept {
                        file_name,
                        port,
                        position,
                    })) => {
                        return Some(SessionEvent::ResumeAccepted {
                            nick: origin.unwrap_or_default(),
                            file_name,
                            port,
                            position,
                        });
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "ignoring malformed DCC request");
                        return None;
                    }
                }
            }
            Some(SessionEvent::PrivateMessage {
                origin,
                target,
                text: text.to_string(),
            })
        }
        _ => match msg.numeric() {
            Some(RPL_WELCOME) => {
                if let Some(nick) = msg.param(0) {
                    handle.set_nick(nick);
                }
                Some(SessionEvent::Connected)
            }
            Some(ERR_NICKNAMEINUSE) => {
                let next = format!("{}_", handle.nick());
                tracing::warn!(nick = %next, "nickname in use; retrying");
                if let Err(err) = handle.send_command(IrcCommand::new("NICK").arg(next.as_str())) {
                    tracing::warn!(error = %err, "failed to send NICK");
                }
                handle.set_nick(&next);
                Some(SessionEvent::Numeric {
                    code: ERR_NICKNAMEINUSE,
                    params: msg.params.clone(),
                })
            }
            Some(code) => Some(SessionEvent::Numeric {
                code,
                params: msg.params.clone(),
            }),
            None => Some(SessionEvent::Raw {
                command: msg.command.clone(),
                origin,
                params: msg.params.clone(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_line_bytes_rejects_oversized_lines() {
        let bytes = vec![b'a'; MAX_IRC_LINE_LEN + 1];
        let err = decode_line_bytes(bytes).unwrap_err();
        assert!(matches!(err, IrcError::BadFrame { .. }));
    }

    #[test]
    fn decode_line_bytes_is_lossy_on_invalid_utf8() {
        let line = decode_line_bytes(vec![b'a', 0xff, b'\r', b'\n']).unwrap();
        assert_eq!(line, "a\u{fffd}");
    }

    #[test]
    fn decode_line_bytes_trims_crlf() {
        let line = decode_line_bytes(b"PING :x\r\n".to_vec()).unwrap();
        assert_eq!(line, "PING :x");
    }
}
