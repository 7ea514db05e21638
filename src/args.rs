//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

/// Download files from XDCC bots via DCC SEND
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IRC server to connect to
    pub server: String,

    /// Channels to join, comma separated (e.g. "#news,#moviegods")
    pub channels: String,

    /// Downloads, comma separated "<bot> <command>" entries (e.g. "bot xdcc send #12")
    pub downloads: String,

    /// Server port (default: 6667, or irc.port from the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Nick to use (default: random)
    #[arg(short, long)]
    pub nick: Option<String>,

    /// Directory to store downloads in
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Login command sent after connecting, e.g. "nickserv identify <password>"
    #[arg(short, long)]
    pub login: Option<String>,

    /// Wait for md5 checksum notices and verify finished files
    #[arg(long, default_value = "false")]
    pub verify: bool,

    /// Only use IPv4
    #[arg(short = '4', long, conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Only use IPv6
    #[arg(short = '6', long)]
    pub ipv6: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file path (default: platform config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_arguments_and_flags() {
        let args = Args::try_parse_from([
            "xdcc-get",
            "irc.example.net",
            "#a,#b",
            "bot xdcc send #1",
            "-p",
            "7000",
            "--verify",
            "-4",
        ])
        .unwrap();
        assert_eq!(args.server, "irc.example.net");
        assert_eq!(args.channels, "#a,#b");
        assert_eq!(args.port, Some(7000));
        assert!(args.verify && args.ipv4 && !args.ipv6);
    }

    #[test]
    fn ipv4_and_ipv6_conflict() {
        let err = Args::try_parse_from(["xdcc-get", "s", "#c", "bot 1", "-4", "-6"]);
        assert!(err.is_err());
    }

    #[test]
    fn missing_downloads_is_rejected() {
        assert!(Args::try_parse_from(["xdcc-get", "s", "#c"]).is_err());
    }
}
