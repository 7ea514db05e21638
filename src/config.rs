use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn default_log_level() -> String {
    // Same default as the classic client: warnings and errors only.
    "warn".to_string()
}
fn default_target_dir() -> String {
    directories::UserDirs::new()
        .and_then(|d| d.download_dir().map(|p| p.display().to_string()))
        .or_else(|| {
            directories::UserDirs::new().map(|d| d.home_dir().join("Downloads").display().to_string())
        })
        .unwrap_or_else(|| "Downloads".to_string())
}
fn default_irc_port() -> u16 {
    6667
}
fn default_io_timeout_secs() -> u64 {
    30
}
fn default_idle_timeout_secs() -> u64 {
    // 0 = never give up on a silent transfer.
    0
}
fn default_progress_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub irc: IrcConfig,
    pub dcc: DccConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// Where finished and partial downloads live.
    pub target_dir: String,
    /// Keep the session open after the last download so an md5 notice can still arrive.
    pub verify_checksum: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    pub port: u16,
    /// Random 20-letter nick when unset.
    pub nick: Option<String>,
    /// `<9-char target><message>`, e.g. `nickserv identify hunter2`.
    pub login_command: Option<String>,
    pub address_family: AddressFamily,
    /// Timeout for writes on the IRC control connection.
    pub io_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DccConfig {
    /// Abandon a transfer after this many silent seconds. `0` waits forever.
    pub idle_timeout_secs: u64,
    pub progress_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    #[default]
    Any,
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn allows(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::Ipv4 => addr.is_ipv4(),
            Self::Ipv6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "IPv4/IPv6"),
            Self::Ipv4 => write!(f, "IPv4"),
            Self::Ipv6 => write!(f, "IPv6"),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            target_dir: default_target_dir(),
            verify_checksum: false,
        }
    }
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            port: default_irc_port(),
            nick: None,
            login_command: None,
            address_family: AddressFamily::default(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl Default for DccConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Config {
    pub fn target_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.target_dir)
    }
}

pub fn init_tracing(log_level: &str) {
    // Priority order:
    // 1) RUST_LOG (standard in Rust ecosystem)
    // 2) --verbose / --quiet, then general.log_level from config.toml
    // 3) default (info)
    //
    // Example:
    // RUST_LOG=info,xdcc_get=debug

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| Some(log_level.to_string()))
        .unwrap_or_else(|| "info".to_string());

    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.irc.port, 6667);
        assert_eq!(cfg.general.log_level, "warn");
        assert!(!cfg.general.verify_checksum);
        assert_eq!(cfg.irc.address_family, AddressFamily::Any);
        assert_eq!(cfg.dcc.idle_timeout_secs, 0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [irc]
            nick = "leecher"
            address_family = "ipv6"

            [general]
            target_dir = "/tmp/dl"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.irc.nick.as_deref(), Some("leecher"));
        assert_eq!(cfg.irc.address_family, AddressFamily::Ipv6);
        assert_eq!(cfg.irc.port, 6667);
        assert_eq!(cfg.target_dir(), PathBuf::from("/tmp/dl"));
        assert_eq!(cfg.dcc.progress_interval_ms, 1000);
    }

    #[test]
    fn address_family_filters_socket_addrs() {
        let v4: SocketAddr = "127.0.0.1:6667".parse().unwrap();
        let v6: SocketAddr = "[::1]:6667".parse().unwrap();
        assert!(AddressFamily::Any.allows(&v4) && AddressFamily::Any.allows(&v6));
        assert!(AddressFamily::Ipv4.allows(&v4) && !AddressFamily::Ipv4.allows(&v6));
        assert!(AddressFamily::Ipv6.allows(&v6) && !AddressFamily::Ipv6.allows(&v4));
    }
}
