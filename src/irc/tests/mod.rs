use super::client::{dispatch, run_reader, run_writer};
use super::*;
use crate::session::{ChatSession, DccOffer, SessionEvent};
use std::net::{IpAddr, Ipv4Addr};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, duplex};
use tokio::sync::mpsc;
use tokio::time::Duration;

fn handle(nick: &str) -> (IrcHandle, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IrcHandle::new(tx, nick), rx)
}

fn ev(h: &IrcHandle, line: &str) -> Option<SessionEvent> {
    dispatch(h, &IrcMessage::parse(line).unwrap())
}

#[test]
fn welcome_marks_connected_and_adopts_server_nick() {
    let (h, _rx) = handle("me");
    assert_eq!(
        ev(&h, ":srv 001 me_ :Welcome to IRC"),
        Some(SessionEvent::Connected)
    );
    assert_eq!(h.nick(), "me_");
}

#[test]
fn ping_is_answered_without_an_event() {
    let (h, mut rx) = handle("me");
    assert_eq!(ev(&h, "PING :irc.example.net"), None);
    assert_eq!(rx.try_recv().unwrap(), "PONG :irc.example.net");
}

#[test]
fn nick_in_use_retries_with_underscore() {
    let (h, mut rx) = handle("me");
    let got = ev(&h, ":srv 433 * me :Nickname is already in use");
    assert!(matches!(got, Some(SessionEvent::Numeric { code: 433, .. })));
    assert_eq!(rx.try_recv().unwrap(), "NICK me_");
    assert_eq!(h.nick(), "me_");
}

#[test]
fn only_own_joins_are_reported() {
    let (h, _rx) = handle("me");
    assert_eq!(
        ev(&h, ":Me!u@h JOIN #chan"),
        Some(SessionEvent::Joined {
            channel: "#chan".to_string()
        })
    );
    assert_eq!(ev(&h, ":other!u@h JOIN :#chan"), None);
}

#[test]
fn mode_is_split_into_user_and_channel_modes() {
    let (h, _rx) = handle("me");
    assert_eq!(
        ev(&h, ":NickServ!s@services MODE me :+r"),
        Some(SessionEvent::UserMode {
            mode: "+r".to_string()
        })
    );
    assert_eq!(
        ev(&h, ":ChanServ!s@services MODE #chan +v me"),
        Some(SessionEvent::ChannelMode {
            channel: "#chan".to_string(),
            mode: "+v".to_string(),
            args: vec!["me".to_string()],
        })
    );
}

#[test]
fn dcc_send_becomes_file_offer() {
    let (h, _rx) = handle("me");
    let got = ev(
        &h,
        ":bot!b@h PRIVMSG me :\x01DCC SEND file.bin 2130706433 5000 1000\x01",
    );
    assert_eq!(
        got,
        Some(SessionEvent::FileOffer(DccOffer {
            nick: "bot".to_string(),
            file_name: "file.bin".to_string(),
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            size: 1000,
        }))
    );
}

#[test]
fn dcc_accept_becomes_resume_ack() {
    let (h, _rx) = handle("me");
    let got = ev(&h, ":bot!b@h PRIVMSG me :\x01DCC ACCEPT file.bin 5000 400\x01");
    assert_eq!(
        got,
        Some(SessionEvent::ResumeAccepted {
            nick: "bot".to_string(),
            file_name: "file.bin".to_string(),
            port: 5000,
            position: 400,
        })
    );
}

#[test]
fn malformed_dcc_is_dropped() {
    let (h, _rx) = handle("me");
    assert_eq!(ev(&h, ":bot!b@h PRIVMSG me :\x01DCC SEND x\x01"), None);
}

#[test]
fn notices_and_plain_messages_keep_origin() {
    let (h, _rx) = handle("me");
    assert_eq!(
        ev(&h, ":bot!b@h NOTICE me :md5sum 0123"),
        Some(SessionEvent::Notice {
            origin: Some("bot".to_string()),
            target: "me".to_string(),
            text: "md5sum 0123".to_string(),
        })
    );
    assert!(matches!(
        ev(&h, ":bot!b@h PRIVMSG me :hi"),
        Some(SessionEvent::PrivateMessage { .. })
    ));
}

#[test]
fn chat_session_commands_render_as_irc_lines() {
    let (mut h, mut rx) = handle("me");
    h.send_message("bot", "xdcc send #1").unwrap();
    h.join("#chan").unwrap();
    h.request_user_mode("+i").unwrap();
    h.disconnect("Goodbye!").unwrap();

    let lines: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(
        lines,
        vec![
            "PRIVMSG bot :xdcc send #1",
            "JOIN #chan",
            "MODE me +i",
            "QUIT :Goodbye!",
        ]
    );
}

#[tokio::test]
async fn reader_emits_events_then_closed_on_eof() {
    let (client, mut server) = duplex(1024);
    let (h, _cmd_rx) = handle("me");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(run_reader(BufReader::new(client), h.clone(), tx));
    server
        .write_all(b":srv 001 me :hi\r\n:me!u@h JOIN #chan\r\n")
        .await
        .unwrap();
    drop(server);
    reader.await.unwrap();

    assert_eq!(rx.recv().await, Some(SessionEvent::Connected));
    assert!(matches!(rx.recv().await, Some(SessionEvent::Joined { .. })));
    assert_eq!(rx.recv().await, Some(SessionEvent::Closed { error: None }));
    assert!(!h.is_connected());
}

#[tokio::test]
async fn writer_terminates_lines_and_stops_after_quit() {
    let (client, mut server) = duplex(1024);
    let (tx, rx) = mpsc::unbounded_channel();

    tx.send("JOIN #chan".to_string()).unwrap();
    tx.send("QUIT :bye".to_string()).unwrap();
    tx.send("PRIVMSG never :sent".to_string()).unwrap();
    run_writer(client, rx, Duration::from_secs(1)).await;

    let mut out = String::new();
    server.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "JOIN #chan\r\nQUIT :bye\r\n");
}
