use crate::{
    args::Args,
    checksum::{ChecksumVerifier, Md5Hasher},
    config::{AddressFamily, Config},
    download::{
        Flow, Orchestrator, OrchestratorConfig, XdccRequest, parse_channels, parse_downloads,
        random_nick,
    },
    irc::{DccConnector, IrcSession, dcc::TRANSFER_QUEUE_LEN},
    session::SessionEvent,
};
use anyhow::Context;
use std::path::PathBuf;
use tokio::{
    sync::mpsc,
    time::{Duration, MissedTickBehavior},
};

/// Everything a run needs, merged from the command line and the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: String,
    pub port: u16,
    pub nick: String,
    pub channels: Vec<String>,
    pub requests: Vec<XdccRequest>,
    pub login_command: Option<String>,
    pub target_dir: PathBuf,
    pub verify_checksum: bool,
    pub address_family: AddressFamily,
    pub io_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub progress_interval: Duration,
    pub log_level: String,
}

impl Settings {
    /// Command-line values win over the config file.
    pub fn resolve(args: Args, cfg: Config) -> anyhow::Result<Self> {
        let channels = parse_channels(&args.channels).context("invalid channel list")?;
        let requests = parse_downloads(&args.downloads).context("invalid download list")?;

        let nick = match args.nick.or(cfg.irc.nick).filter(|n| !n.trim().is_empty()) {
            Some(nick) => nick.trim().to_string(),
            None => random_nick()?,
        };

        let address_family = if args.ipv4 {
            AddressFamily::Ipv4
        } else if args.ipv6 {
            AddressFamily::Ipv6
        } else {
            cfg.irc.address_family
        };

        let log_level = if args.verbose {
            "debug".to_string()
        } else if args.quiet {
            "error".to_string()
        } else {
            cfg.general.log_level.clone()
        };

        let target_dir = args
            .directory
            .unwrap_or_else(|| PathBuf::from(&cfg.general.target_dir));
        let idle_timeout =
            (cfg.dcc.idle_timeout_secs > 0).then(|| Duration::from_secs(cfg.dcc.idle_timeout_secs));

        Ok(Self {
            server: args.server,
            port: args.port.unwrap_or(cfg.irc.port),
            nick,
            channels,
            requests,
            login_command: args.login.or(cfg.irc.login_command),
            target_dir,
            verify_checksum: args.verify || cfg.general.verify_checksum,
            address_family,
            io_timeout: Duration::from_secs(cfg.irc.io_timeout_secs.max(1)),
            idle_timeout,
            progress_interval: Duration::from_millis(cfg.dcc.progress_interval_ms.max(100)),
            log_level,
        })
    }
}

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        server = %settings.server,
        port = settings.port,
        nick = %settings.nick,
        family = %settings.address_family,
        target_dir = %settings.target_dir.display(),
        downloads = settings.requests.len(),
        "starting xdcc-get"
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (transfer_tx, mut transfer_rx) = mpsc::channel::<SessionEvent>(TRANSFER_QUEUE_LEN);

    // An interrupt before the session exists ends the run cleanly.
    let session = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted before connecting");
            return Ok(());
        }
        session = IrcSession::connect(
            &settings.server,
            settings.port,
            &settings.nick,
            settings.address_family,
            settings.io_timeout,
            events_tx,
        ) => session.with_context(|| {
            format!("could not connect to {}:{}", settings.server, settings.port)
        })?,
    };

    let transport = DccConnector::new(session.handle(), transfer_tx, settings.idle_timeout);
    let mut orch = Orchestrator::new(
        session.handle(),
        transport,
        ChecksumVerifier::new(Md5Hasher),
        OrchestratorConfig {
            target_dir: settings.target_dir.clone(),
            login_command: settings.login_command.clone(),
            channels: settings.channels.clone(),
            requests: settings.requests.clone(),
            verify_checksum: settings.verify_checksum,
            ipv4_only: settings.address_family == AddressFamily::Ipv4,
        },
    );

    let mut progress_tick = tokio::time::interval(settings.progress_interval);
    progress_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let outcome: anyhow::Result<()> = loop {
        let flow = tokio::select! {
            _ = tokio::signal::ctrl_c() => orch.interrupt(),

            _ = progress_tick.tick(), if orch.ticker_running() => {
                orch.on_tick();
                Flow::Continue
            }

            Some(ev) = transfer_rx.recv() => match orch.handle_event(ev).await {
                Ok(flow) => flow,
                Err(err) => break Err(err.into()),
            },

            ev = events_rx.recv() => match ev {
                Some(ev) => match orch.handle_event(ev).await {
                    Ok(flow) => flow,
                    Err(err) => break Err(err.into()),
                },
                None => Flow::Exit,
            },
        };
        orch.flush_progress();
        if flow == Flow::Exit {
            break Ok(());
        }
    };

    // Session first, then the files it was feeding.
    session.shutdown().await;
    orch.teardown().await;

    if let Err(err) = &outcome {
        tracing::error!(error = %err, "aborting");
    } else {
        tracing::info!(
            finished = orch.registry().finished_count(),
            requested = orch.registry().capacity(),
            "done"
        );
    }
    outcome
}
