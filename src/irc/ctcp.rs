//! CTCP framing and the DCC SEND/RESUME/ACCEPT sub-protocol.

use crate::irc::IrcError;
use crate::session::DccOffer;
use std::net::{IpAddr, Ipv4Addr};

type Result<T> = std::result::Result<T, IrcError>;

const CTCP_DELIM: char = '\x01';

/// DCC requests we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DccMessage {
    Send(DccOffer),
    Accept {
        file_name: String,
        port: u16,
        position: u64,
    },
}

/// Body of a CTCP message (`\x01VERB args\x01`), if `text` is one.
pub fn ctcp_body(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(CTCP_DELIM)?;
    Some(inner.strip_suffix(CTCP_DELIM).unwrap_or(inner))
}

pub fn wrap_ctcp(body: &str) -> String {
    format!("{CTCP_DELIM}{body}{CTCP_DELIM}")
}

/// Parse a CTCP body as a DCC request. Returns `Ok(None)` for other CTCP verbs and DCC types.
pub fn parse_dcc(nick: &str, body: &str) -> Result<Option<DccMessage>> {
    let Some(rest) = body.strip_prefix("DCC ") else {
        return Ok(None);
    };
    let rest = rest.trim_start();
    let (kind, args) = rest.split_once(' ').unwrap_or((rest, ""));

    match kind.to_ascii_uppercase().as_str() {
        "SEND" => {
            let (file_name, fields) = split_file_name(args, body)?;
            let [addr, port, size] = take_fields::<3>(&fields, body)?;
            Ok(Some(DccMessage::Send(DccOffer {
                nick: nick.to_string(),
                file_name,
                addr: parse_addr(addr, body)?,
                port: parse_num(port, "DCC SEND port", body)?,
                size: parse_num(size, "DCC SEND size", body)?,
            })))
        }
        "ACCEPT" => {
            let (file_name, fields) = split_file_name(args, body)?;
            let [port, position] = take_fields::<2>(&fields, body)?;
            Ok(Some(DccMessage::Accept {
                file_name,
                port: parse_num(port, "DCC ACCEPT port", body)?,
                position: parse_num(position, "DCC ACCEPT position", body)?,
            }))
        }
        _ => Ok(None),
    }
}

/// CTCP body asking the sender to continue `offer` from `position`.
pub fn dcc_resume_body(offer: &DccOffer, position: u64) -> String {
    format!(
        "DCC RESUME {} {} {position}",
        quote_file_name(&offer.file_name),
        offer.port
    )
}

fn quote_file_name(name: &str) -> String {
    if name.contains(' ') {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

/// Split `"<file>" a b c` or `<file> a b c` into the file name and the remaining fields.
fn split_file_name<'a>(args: &'a str, raw: &str) -> Result<(String, Vec<&'a str>)> {
    let args = args.trim_start();
    if let Some(quoted) = args.strip_prefix('"') {
        let (name, rest) = quoted.split_once('"').ok_or_else(|| IrcError::BadFrame {
            what: "unterminated quoted DCC file name",
            raw: raw.to_string(),
        })?;
        return Ok((name.to_string(), rest.split_whitespace().collect()));
    }
    let mut parts = args.split_whitespace();
    let name = parts.next().ok_or_else(|| IrcError::BadFrame {
        what: "DCC request without file name",
        raw: raw.to_string(),
    })?;
    Ok((name.to_string(), parts.collect()))
}

/// The first `N` fields; extra trailing fields (reverse-DCC tokens) are ignored.
fn take_fields<'a, const N: usize>(fields: &[&'a str], raw: &str) -> Result<[&'a str; N]> {
    if fields.len() < N {
        return Err(IrcError::BadFrame {
            what: "DCC request is missing fields",
            raw: raw.to_string(),
        });
    }
    let mut out = [""; N];
    out.copy_from_slice(&fields[..N]);
    Ok(out)
}

fn parse_num<T: std::str::FromStr>(value: &str, what: &'static str, raw: &str) -> Result<T> {
    value.parse().map_err(|_| IrcError::BadFrame {
        what,
        raw: raw.to_string(),
    })
}

/// DCC encodes IPv4 as a decimal host-order u32; IPv6 peers send a literal address.
fn parse_addr(value: &str, raw: &str) -> Result<IpAddr> {
    if let Ok(n) = value.parse::<u32>() {
        return Ok(IpAddr::V4(Ipv4Addr::from(n)));
    }
    value.parse().map_err(|_| IrcError::BadFrame {
        what: "DCC SEND address",
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctcp_body_strips_delimiters() {
        assert_eq!(ctcp_body("\x01VERSION\x01"), Some("VERSION"));
        assert_eq!(ctcp_body("\x01DCC SEND a 1 2 3"), Some("DCC SEND a 1 2 3"));
        assert_eq!(ctcp_body("plain text"), None);
    }

    #[test]
    fn parses_dcc_send_with_decimal_ipv4() {
        let msg = parse_dcc("bot", "DCC SEND file.bin 2130706433 5000 1000")
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            DccMessage::Send(DccOffer {
                nick: "bot".to_string(),
                file_name: "file.bin".to_string(),
                addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 5000,
                size: 1000,
            })
        );
    }

    #[test]
    fn parses_quoted_file_name_and_ipv6() {
        let Some(DccMessage::Send(offer)) =
            parse_dcc("bot", "DCC SEND \"my file.mkv\" ::1 6000 42").unwrap()
        else {
            panic!("expected DCC SEND");
        };
        assert_eq!(offer.file_name, "my file.mkv");
        assert_eq!(offer.addr, "::1".parse::<IpAddr>().unwrap());
        assert_eq!(offer.size, 42);
    }

    #[test]
    fn parses_dcc_accept() {
        let msg = parse_dcc("bot", "DCC ACCEPT file.bin 5000 400").unwrap();
        assert_eq!(
            msg,
            Some(DccMessage::Accept {
                file_name: "file.bin".to_string(),
                port: 5000,
                position: 400,
            })
        );
    }

    #[test]
    fn ignores_other_ctcp_and_dcc_kinds() {
        assert_eq!(parse_dcc("bot", "VERSION").unwrap(), None);
        assert_eq!(parse_dcc("bot", "DCC CHAT chat 1 2").unwrap(), None);
    }

    #[test]
    fn rejects_truncated_send() {
        let err = parse_dcc("bot", "DCC SEND file.bin 2130706433").unwrap_err();
        assert!(matches!(err, IrcError::BadFrame { .. }));
        let err = parse_dcc("bot", "DCC SEND file.bin 1 2 notanumber").unwrap_err();
        assert!(matches!(err, IrcError::BadFrame { .. }));
    }

    #[test]
    fn resume_body_quotes_names_with_spaces() {
        let offer = DccOffer {
            nick: "bot".to_string(),
            file_name: "a b.bin".to_string(),
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            size: 1000,
        };
        assert_eq!(dcc_resume_body(&offer, 400), "DCC RESUME \"a b.bin\" 5000 400");
        assert_eq!(wrap_ctcp("X"), "\x01X\x01");
    }
}
