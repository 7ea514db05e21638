use crate::irc::IrcError;

type Result<T> = std::result::Result<T, IrcError>;

/// A parsed IRC line, e.g.:
/// `:bot!~bot@host NOTICE me :md5sum 0123...`
/// `PING :irc.example.net`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn parse(line: &str) -> Result<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        // IRCv3 message tags carry nothing we use.
        if rest.starts_with('@') {
            rest = match rest.split_once(' ') {
                Some((_, r)) => r,
                None => "",
            };
        }
        rest = rest.trim_start_matches(' ');

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, r) = stripped.split_once(' ').ok_or_else(|| IrcError::BadFrame {
                what: "prefix without command",
                raw: line.to_string(),
            })?;
            prefix = Some(p.to_string());
            rest = r.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((c, r)) => (c, r),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(IrcError::BadFrame {
                what: "missing command",
                raw: line.to_string(),
            });
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((p, r)) => {
                    params.push(p.to_string());
                    rest = r;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Three-digit server replies (`001`, `433`, ...).
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }
}

/// A client command builder for the line-based protocol.
///
/// Values are sanitised here so a config value containing CR/LF cannot smuggle in a second
/// command.
#[derive(Debug, Clone)]
pub struct IrcCommand {
    pub verb: &'static str,
    pub args: Vec<String>,
    pub trailing: Option<String>,
}

impl IrcCommand {
    pub fn new(verb: &'static str) -> Self {
        Self {
            verb,
            args: Vec::new(),
            trailing: None,
        }
    }

    pub fn arg(mut self, v: impl Into<String>) -> Self {
        self.args.push(v.into());
        self
    }

    pub fn trailing(mut self, v: impl Into<String>) -> Self {
        self.trailing = Some(v.into());
        self
    }

    /// Render to a single line (without trailing CRLF).
    pub fn to_line(&self) -> String {
        let mut s = String::from(self.verb);
        for a in &self.args {
            s.push(' ');
            s.push_str(&sanitize(a).replace(' ', ""));
        }
        if let Some(t) = &self.trailing {
            s.push_str(" :");
            s.push_str(&sanitize(t));
        }
        s
    }
}

fn sanitize(v: &str) -> String {
    v.chars().filter(|c| *c != '\r' && *c != '\n' && *c != '\0').collect()
}

/// Remove mIRC colour and formatting control codes.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\x03' => {
                // \x03[fg[,bg]] with up to two digits each.
                skip_digits(&mut chars, 2);
                if chars.peek() == Some(&',') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                        chars.next();
                        skip_digits(&mut chars, 2);
                    }
                }
            }
            '\x02' | '\x0f' | '\x11' | '\x16' | '\x1d' | '\x1e' | '\x1f' => {}
            other => out.push(other),
        }
    }
    out
}

fn skip_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, max: usize) {
    for _ in 0..max {
        match chars.peek() {
            Some(c) if c.is_ascii_digit() => {
                chars.next();
            }
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_params_and_trailing() {
        let m = IrcMessage::parse(":bot!~x@host.example NOTICE me :hello there\r\n").unwrap();
        assert_eq!(m.prefix.as_deref(), Some("bot!~x@host.example"));
        assert_eq!(m.nick(), Some("bot"));
        assert_eq!(m.command, "NOTICE");
        assert_eq!(m.params, vec!["me", "hello there"]);
    }

    #[test]
    fn parses_without_prefix_or_trailing() {
        let m = IrcMessage::parse("MODE #chan +v someone").unwrap();
        assert!(m.prefix.is_none());
        assert_eq!(m.params, vec!["#chan", "+v", "someone"]);
    }

    #[test]
    fn skips_message_tags() {
        let m = IrcMessage::parse("@time=2024-01-01T00:00:00Z :srv 001 me :Welcome").unwrap();
        assert_eq!(m.numeric(), Some(1));
        assert_eq!(m.param(0), Some("me"));
    }

    #[test]
    fn rejects_prefix_only_line() {
        let err = IrcMessage::parse(":lonely").unwrap_err();
        assert!(matches!(err, IrcError::BadFrame { .. }));
    }

    #[test]
    fn numeric_is_only_three_digits() {
        assert_eq!(IrcMessage::parse("433 * me :in use").unwrap().numeric(), Some(433));
        assert_eq!(IrcMessage::parse("PRIVMSG a :b").unwrap().numeric(), None);
    }

    #[test]
    fn renders_command_and_strips_line_breaks() {
        let cmd = IrcCommand::new("PRIVMSG")
            .arg("bot")
            .trailing("xdcc send #1\r\nQUIT");
        assert_eq!(cmd.to_line(), "PRIVMSG bot :xdcc send #1QUIT");
        assert_eq!(IrcCommand::new("JOIN").arg("#chan").to_line(), "JOIN #chan");
    }

    #[test]
    fn strips_colour_codes() {
        assert_eq!(strip_formatting("\x0304,12red\x03 \x02bold\x02"), "red bold");
        assert_eq!(strip_formatting("\x031,text"), ",text");
        assert_eq!(strip_formatting("plain"), "plain");
    }
}
