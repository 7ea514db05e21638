//! The control loop's brain: reacts to session events and ticks, owns every transfer record.

use crate::checksum::{ChecksumTask, extract_md5};
use crate::download::errors::DownloadError;
use crate::download::flags::ProcessFlags;
use crate::download::login::{LoginSequencer, LoginState};
use crate::download::progress::ProgressReporter;
use crate::download::record::TransferRecord;
use crate::download::registry::DownloadRegistry;
use crate::download::request::XdccRequest;
use crate::download::resume::{
    ResumeDecision, open_for_append, resolve_offer, validate_file_name,
};
use crate::irc::strip_formatting;
use crate::logging::warn_throttled;
use crate::session::{
    ChatSession, ChunkStatus, DccOffer, DccTransport, SessionEvent, TransferId,
    VerificationSpawner,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub type Result<T> = std::result::Result<T, DownloadError>;

const QUIT_MESSAGE: &str = "Goodbye!";
const CHUNK_WARN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub target_dir: PathBuf,
    pub login_command: Option<String>,
    pub channels: Vec<String>,
    pub requests: Vec<XdccRequest>,
    pub verify_checksum: bool,
    pub ipv4_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Orchestrator<S, T, V> {
    session: S,
    transport: T,
    verifier: V,
    target_dir: PathBuf,
    sequencer: LoginSequencer,
    registry: DownloadRegistry,
    flags: ProcessFlags,
    reporter: ProgressReporter,
    /// Resume requests waiting for `DCC ACCEPT`, keyed by the peer's lowercased nick and port.
    pending_resumes: HashMap<(String, u16), TransferId>,
    ticker_running: bool,
    quit_requested: bool,
    console: Box<dyn Write + Send>,
}

impl<S, T, V> Orchestrator<S, T, V>
where
    S: ChatSession,
    T: DccTransport,
    V: VerificationSpawner,
{
    pub fn new(session: S, transport: T, verifier: V, cfg: OrchestratorConfig) -> Self {
        let capacity = cfg.requests.len();
        Self {
            session,
            transport,
            verifier,
            target_dir: cfg.target_dir,
            sequencer: LoginSequencer::new(cfg.login_command, cfg.channels, cfg.requests),
            registry: DownloadRegistry::new(capacity),
            flags: ProcessFlags::new(cfg.verify_checksum, cfg.ipv4_only),
            reporter: ProgressReporter::new(),
            pending_resumes: HashMap::new(),
            ticker_running: true,
            quit_requested: false,
            console: Box::new(std::io::stdout()),
        }
    }

    /// Send progress output and peer messages somewhere other than stdout.
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = console;
        self
    }

    pub fn registry(&self) -> &DownloadRegistry {
        &self.registry
    }

    pub fn flags(&self) -> &ProcessFlags {
        &self.flags
    }

    pub fn login_state(&self) -> LoginState {
        self.sequencer.state()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker_running
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Progress timer fired. Only raises the flag; output happens in [`Self::flush_progress`].
    pub fn on_tick(&mut self) {
        self.flags.request_report();
    }

    /// Print a snapshot if a tick asked for one since the last call.
    pub fn flush_progress(&mut self) {
        if !self.flags.take_report() {
            return;
        }
        let snapshot = self.reporter.render(&self.registry, Instant::now());
        let _ = self.console.write_all(snapshot.as_bytes());
        let _ = self.console.flush();
    }

    /// Operator interrupt. The first one asks the server to close the session; afterwards, or
    /// without a live session, the loop ends right away.
    pub fn interrupt(&mut self) -> Flow {
        if self.quit_requested || !self.session.is_connected() {
            return Flow::Exit;
        }
        tracing::info!("interrupted, disconnecting");
        self.request_quit();
        Flow::Continue
    }

    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<Flow> {
        match event {
            SessionEvent::Connected => {
                tracing::info!("connected to server");
                self.sequencer.on_connected(&mut self.session);
            }
            SessionEvent::Joined { channel } => {
                self.sequencer
                    .on_joined(&mut self.session, &mut self.flags, &channel);
            }
            SessionEvent::UserMode { mode } => {
                tracing::debug!(mode = %mode, "user mode changed");
                self.sequencer.on_user_mode(&mut self.session, &mode);
            }
            SessionEvent::ChannelMode {
                channel,
                mode,
                args,
            } => {
                dump_event(
                    "MODE",
                    None,
                    &[channel.as_str(), mode.as_str(), args.join(" ").as_str()],
                );
                self.sequencer
                    .on_channel_mode(&mut self.session, &mut self.flags, &mode);
            }
            SessionEvent::Notice {
                origin,
                target,
                text,
            } => {
                dump_event("NOTICE", origin.as_deref(), &[target.as_str(), text.as_str()]);
                self.handle_notice(&text);
            }
            SessionEvent::PrivateMessage {
                origin,
                target,
                text,
            } => {
                dump_event("PRIVMSG", origin.as_deref(), &[target.as_str(), text.as_str()]);
                let _ = writeln!(
                    self.console,
                    "'{}' said me ({}): {}",
                    origin.as_deref().unwrap_or("someone"),
                    target,
                    strip_formatting(&text)
                );
            }
            SessionEvent::Numeric { code, params } => {
                let params: Vec<&str> = params.iter().map(String::as_str).collect();
                dump_event(&format!("{code:03}"), None, &params);
            }
            SessionEvent::Raw {
                command,
                origin,
                params,
            } => {
                let params: Vec<&str> = params.iter().map(String::as_str).collect();
                dump_event(&command, origin.as_deref(), &params);
            }
            SessionEvent::FileOffer(offer) => self.handle_offer(offer).await?,
            SessionEvent::ResumeAccepted {
                nick,
                file_name,
                port,
                position,
            } => {
                self.handle_resume_accepted(&nick, &file_name, port, position)
                    .await?
            }
            SessionEvent::AcceptFailed { id, error } => {
                let file_name = self
                    .registry
                    .get(id)
                    .map(|r| r.file_name().to_string())
                    .unwrap_or_default();
                return Err(DownloadError::TransferFailed { file_name, error });
            }
            SessionEvent::Transfer { id, chunk } => self.handle_chunk(id, chunk).await?,
            SessionEvent::Closed { error } => {
                return match error {
                    Some(error) if !self.quit_requested => {
                        Err(DownloadError::SessionClosed { error })
                    }
                    Some(error) => {
                        tracing::debug!(error = %error, "session ended after quit");
                        Ok(Flow::Exit)
                    }
                    None => {
                        tracing::info!("session closed");
                        Ok(Flow::Exit)
                    }
                };
            }
        }
        Ok(Flow::Continue)
    }

    /// Close whatever is still open. Call after the session is gone.
    pub async fn teardown(&mut self) {
        self.registry.teardown().await;
        let _ = self.console.flush();
    }

    fn request_quit(&mut self) {
        self.quit_requested = true;
        if let Err(err) = self.session.disconnect(QUIT_MESSAGE) {
            tracing::warn!(error = %err, "could not send quit");
        }
    }

    fn handle_notice(&mut self, text: &str) {
        let Some(md5) = extract_md5(&strip_formatting(text)) else {
            return;
        };
        let Some(record) = self.registry.last_completed() else {
            tracing::debug!(md5 = %md5, "checksum notice before any completed download");
            return;
        };
        tracing::info!(md5 = %md5, path = %record.path().display(), "checksum announced");
        let task = ChecksumTask::new(md5, record.path());
        self.verifier.spawn_verification(task);
    }

    async fn handle_offer(&mut self, offer: DccOffer) -> Result<()> {
        tracing::info!(
            peer = %offer.nick,
            addr = %offer.addr,
            port = offer.port,
            file = %offer.file_name,
            size = offer.size,
            "DCC send offered"
        );
        validate_file_name(&offer.file_name)?;

        let Some(id) = self.registry.next_id() else {
            tracing::warn!(
                file = %offer.file_name,
                capacity = self.registry.capacity(),
                "ignoring offer: every requested download already has a transfer"
            );
            return Ok(());
        };
        if self.flags.ipv4_only() && offer.addr.is_ipv6() {
            tracing::warn!(file = %offer.file_name, "ignoring IPv6 offer in IPv4-only mode");
            return Ok(());
        }

        match resolve_offer(&self.target_dir, &offer).await? {
            ResumeDecision::Fresh { path, file } => {
                let record = TransferRecord::fresh(id, offer.clone(), path, file);
                self.register(record)?;
                self.ticker_running = true;
                self.transport.accept(id, &offer, 0)?;
                if self.registry.get(id).is_some_and(TransferRecord::is_complete) {
                    self.complete_transfer(id).await?;
                }
            }
            ResumeDecision::Resume { path, offset } => {
                let record = TransferRecord::resuming(id, offer.clone(), path, offset);
                self.register(record)?;
                self.ticker_running = true;
                self.pending_resumes.insert(resume_key(&offer.nick, offer.port), id);
                self.transport.request_resume(&offer, offset)?;
            }
        }
        Ok(())
    }

    fn register(&mut self, record: TransferRecord) -> Result<TransferId> {
        self.registry
            .register(record)
            .map_err(|record| DownloadError::TransferFailed {
                file_name: record.file_name().to_string(),
                error: "no free transfer slot".to_string(),
            })
    }

    async fn handle_resume_accepted(
        &mut self,
        nick: &str,
        file_name: &str,
        port: u16,
        position: u64,
    ) -> Result<()> {
        let Some(id) = self.pending_resumes.remove(&resume_key(nick, port)) else {
            tracing::warn!(peer = %nick, file = %file_name, port, "DCC ACCEPT for unknown resume request");
            return Ok(());
        };
        let Some(record) = self.registry.get_mut(id) else {
            return Ok(());
        };
        if position != record.received() {
            return Err(DownloadError::TransferFailed {
                file_name: record.file_name().to_string(),
                error: format!(
                    "peer resumes at {position}, local file has {} bytes",
                    record.received()
                ),
            });
        }

        tracing::info!(transfer = %id, file = %file_name, position, "resume accepted");
        let file = open_for_append(record.path()).await?;
        record.attach_file(file);
        let offer = record.offer().clone();
        self.transport.accept(id, &offer, position)?;
        Ok(())
    }

    async fn handle_chunk(&mut self, id: TransferId, chunk: ChunkStatus) -> Result<()> {
        let data = match chunk {
            ChunkStatus::Failed(error) => {
                tracing::error!(transfer = %id, error = %error, "transfer failed, abandoning it");
                if let Some(record) = self.registry.get_mut(id)
                    && let Err(err) = record.close().await
                {
                    tracing::warn!(transfer = %id, error = %err, "closing abandoned transfer");
                }
                return Ok(());
            }
            ChunkStatus::Data(data) => data,
        };

        if data.is_empty() {
            if warn_throttled("empty_dcc_chunk", CHUNK_WARN_INTERVAL) {
                tracing::warn!(transfer = %id, "received an empty chunk");
            }
            return Ok(());
        }
        let Some(record) = self.registry.get_mut(id).filter(|r| r.has_file()) else {
            if warn_throttled("orphan_dcc_chunk", CHUNK_WARN_INTERVAL) {
                tracing::warn!(transfer = %id, len = data.len(), "chunk for an unknown or closed transfer");
            }
            return Ok(());
        };

        let kept = record.append(&data).await?;
        if kept < data.len() {
            tracing::warn!(
                transfer = %id,
                dropped = data.len() - kept,
                "peer sent more than the offered size"
            );
        }
        if record.is_complete() {
            self.complete_transfer(id).await?;
        }
        Ok(())
    }

    async fn complete_transfer(&mut self, id: TransferId) -> Result<()> {
        if self.registry.active_count() == 1 {
            self.ticker_running = false;
        }
        let Some(record) = self.registry.get_mut(id) else {
            return Ok(());
        };

        let line = self.reporter.line_for(record, Instant::now());
        let _ = write!(self.console, "{line}\nDownload completed!\n");
        let _ = self.console.flush();

        record.close().await?;
        tracing::info!(
            transfer = %id,
            path = %record.path().display(),
            bytes = record.expected(),
            elapsed_secs = record.started_at().elapsed().as_secs(),
            "download completed"
        );
        self.registry.mark_finished(id);

        if !self.flags.verify_checksum() && self.registry.all_finished() {
            tracing::info!("all downloads finished");
            self.request_quit();
        }
        Ok(())
    }
}

fn resume_key(nick: &str, port: u16) -> (String, u16) {
    (nick.to_ascii_lowercase(), port)
}

/// Log an incoming event with its colour-stripped parameters joined by `|`.
fn dump_event(event: &str, origin: Option<&str>, params: &[&str]) {
    let joined = params
        .iter()
        .map(|p| strip_formatting(p))
        .collect::<Vec<_>>()
        .join("|");
    tracing::info!(
        event = %event,
        origin = origin.unwrap_or("NULL"),
        count = params.len(),
        "event [{joined}]"
    );
}
