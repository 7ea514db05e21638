//! Parsing of the channel and download lists given on the command line.

use std::fmt;

pub const RANDOM_NICK_LEN: usize = 20;

/// One request command to send to a bot, e.g. `xdcc send #12` to `SomeBot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XdccRequest {
    pub bot: String,
    pub command: String,
}

impl fmt::Display for XdccRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- '{}'", self.bot, self.command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    NoChannels,
    NoDownloads,
    MissingCommand { entry: String },
    RandomNick(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChannels => write!(f, "no channels to join were given"),
            Self::NoDownloads => write!(f, "no downloads were given"),
            Self::MissingCommand { entry } => write!(
                f,
                "download '{entry}' has no command, expected '<bot> <command>' (e.g. 'bot xdcc send #1')"
            ),
            Self::RandomNick(msg) => write!(f, "could not generate a random nick: {msg}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// `"news, #movies"` becomes `["#news", "#movies"]`.
pub fn parse_channels(raw: &str) -> Result<Vec<String>, RequestError> {
    let channels: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| {
            if c.starts_with(['#', '&']) {
                c.to_string()
            } else {
                format!("#{c}")
            }
        })
        .collect();
    if channels.is_empty() {
        return Err(RequestError::NoChannels);
    }
    Ok(channels)
}

/// Comma separated `"<bot> <command>"` entries. A bare pack number expands to `xdcc send #n`.
pub fn parse_downloads(raw: &str) -> Result<Vec<XdccRequest>, RequestError> {
    let mut out = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((bot, command)) = entry.split_once(char::is_whitespace) else {
            return Err(RequestError::MissingCommand {
                entry: entry.to_string(),
            });
        };
        let command = command.trim();
        if command.is_empty() {
            return Err(RequestError::MissingCommand {
                entry: entry.to_string(),
            });
        }
        out.push(XdccRequest {
            bot: bot.to_string(),
            command: expand_pack_number(command),
        });
    }
    if out.is_empty() {
        return Err(RequestError::NoDownloads);
    }
    Ok(out)
}

fn expand_pack_number(command: &str) -> String {
    let digits = command.strip_prefix('#').unwrap_or(command);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        format!("xdcc send #{digits}")
    } else {
        command.to_string()
    }
}

/// Twenty random lowercase letters.
pub fn random_nick() -> Result<String, RequestError> {
    let mut bytes = [0u8; RANDOM_NICK_LEN];
    getrandom::getrandom(&mut bytes).map_err(|e| RequestError::RandomNick(format!("{e:?}")))?;
    Ok(bytes.iter().map(|b| char::from(b'a' + b % 26)).collect())
}
