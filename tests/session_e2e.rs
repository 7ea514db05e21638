use std::{
    net::Ipv4Addr,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines},
    net::{TcpListener, TcpStream, tcp::OwnedReadHalf},
};
use xdcc_get::{
    app::{self, Settings},
    config::AddressFamily,
    download::XdccRequest,
};

const NICK: &str = "tester";
const LOCALHOST_U32: u32 = 2130706433;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    let id = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("{prefix}_{}_{}", std::process::id(), id))
}

fn settings(port: u16, target_dir: PathBuf) -> Settings {
    Settings {
        server: Ipv4Addr::LOCALHOST.to_string(),
        port,
        nick: NICK.to_string(),
        channels: vec!["#chan".to_string()],
        requests: vec![XdccRequest {
            bot: "Bot1".to_string(),
            command: "xdcc send #1".to_string(),
        }],
        login_command: None,
        target_dir,
        verify_checksum: false,
        address_family: AddressFamily::Ipv4,
        io_timeout: Duration::from_secs(5),
        idle_timeout: Some(Duration::from_secs(5)),
        progress_interval: Duration::from_millis(100),
        log_level: "debug".to_string(),
    }
}

fn payload() -> Vec<u8> {
    (0..200_000u32).map(|i| (i % 251) as u8).collect()
}

/// Next line starting with `prefix`, skipping anything else the client sends.
async fn next_matching(lines: &mut Lines<BufReader<OwnedReadHalf>>, prefix: &str) -> String {
    loop {
        let line = lines
            .next_line()
            .await
            .expect("read line")
            .unwrap_or_else(|| panic!("client hung up before sending '{prefix}'"));
        if line.starts_with(prefix) {
            return line;
        }
    }
}

/// Register the client, let it join and wait for its XDCC request.
async fn handshake(sock: TcpStream) -> (Lines<BufReader<OwnedReadHalf>>, tokio::net::tcp::OwnedWriteHalf) {
    let (r, mut w) = sock.into_split();
    let mut lines = BufReader::new(r).lines();

    assert_eq!(next_matching(&mut lines, "NICK").await, format!("NICK {NICK}"));
    next_matching(&mut lines, "USER").await;
    w.write_all(format!(":irc.test 001 {NICK} :Welcome\r\n").as_bytes())
        .await
        .unwrap();

    assert_eq!(next_matching(&mut lines, "JOIN").await, "JOIN #chan");
    w.write_all(format!(":{NICK}!u@localhost JOIN #chan\r\n").as_bytes())
        .await
        .unwrap();

    assert_eq!(
        next_matching(&mut lines, "PRIVMSG Bot1").await,
        "PRIVMSG Bot1 :xdcc send #1"
    );
    (lines, w)
}

/// Send `data` over an accepted DCC connection and wait until the receiver acked `total`.
async fn serve_dcc(listener: TcpListener, data: &[u8], total: u32) {
    let (mut sock, _) = listener.accept().await.unwrap();
    sock.write_all(data).await.unwrap();
    let mut ack = [0u8; 4];
    loop {
        sock.read_exact(&mut ack).await.unwrap();
        if u32::from_be_bytes(ack) == total {
            break;
        }
    }
}

#[tokio::test]
async fn downloads_offered_file_and_quits() {
    let dir = unique_temp_dir("xdcc_get_e2e_fresh");
    let irc = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let irc_port = irc.local_addr().unwrap().port();
    let data = payload();
    let server_data = data.clone();

    let server = tokio::spawn(async move {
        let (sock, _) = irc.accept().await.unwrap();
        let (mut lines, mut w) = handshake(sock).await;

        let dcc = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let dcc_port = dcc.local_addr().unwrap().port();
        let offer = format!(
            ":Bot1!b@bots PRIVMSG {NICK} :\x01DCC SEND data.bin {LOCALHOST_U32} {dcc_port} {}\x01\r\n",
            server_data.len()
        );
        w.write_all(offer.as_bytes()).await.unwrap();
        serve_dcc(dcc, &server_data, server_data.len() as u32).await;

        let quit = next_matching(&mut lines, "QUIT").await;
        drop(w);
        quit
    });

    let result = tokio::time::timeout(Duration::from_secs(20), app::run(settings(irc_port, dir.clone())))
        .await
        .expect("run finished in time");
    assert!(result.is_ok(), "{result:?}");

    assert_eq!(server.await.unwrap(), "QUIT :Goodbye!");
    assert_eq!(std::fs::read(dir.join("data.bin")).unwrap(), data);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn resumes_partial_file() {
    let dir = unique_temp_dir("xdcc_get_e2e_resume");
    let data = payload();
    let have = 70_000usize;
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("data.bin"), &data[..have]).unwrap();

    let irc = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let irc_port = irc.local_addr().unwrap().port();
    let server_data = data.clone();

    let server = tokio::spawn(async move {
        let (sock, _) = irc.accept().await.unwrap();
        let (mut lines, mut w) = handshake(sock).await;

        let dcc = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let dcc_port = dcc.local_addr().unwrap().port();
        let offer = format!(
            ":Bot1!b@bots PRIVMSG {NICK} :\x01DCC SEND data.bin {LOCALHOST_U32} {dcc_port} {}\x01\r\n",
            server_data.len()
        );
        w.write_all(offer.as_bytes()).await.unwrap();

        let resume = next_matching(&mut lines, "PRIVMSG Bot1 :\x01DCC RESUME").await;
        assert_eq!(
            resume,
            format!("PRIVMSG Bot1 :\x01DCC RESUME data.bin {dcc_port} {have}\x01")
        );
        let accept = format!(":Bot1!b@bots PRIVMSG {NICK} :\x01DCC ACCEPT data.bin {dcc_port} {have}\x01\r\n");
        w.write_all(accept.as_bytes()).await.unwrap();

        serve_dcc(dcc, &server_data[have..], server_data.len() as u32).await;
        next_matching(&mut lines, "QUIT").await;
    });

    let result = tokio::time::timeout(Duration::from_secs(20), app::run(settings(irc_port, dir.clone())))
        .await
        .expect("run finished in time");
    assert!(result.is_ok(), "{result:?}");
    server.await.unwrap();

    assert_eq!(std::fs::read(dir.join("data.bin")).unwrap(), data);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn already_downloaded_file_fails_the_run() {
    let dir = unique_temp_dir("xdcc_get_e2e_complete");
    let data = payload();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("data.bin"), &data).unwrap();

    let irc = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let irc_port = irc.local_addr().unwrap().port();
    let len = data.len();

    let server = tokio::spawn(async move {
        let (sock, _) = irc.accept().await.unwrap();
        let (mut lines, mut w) = handshake(sock).await;
        let offer = format!(
            ":Bot1!b@bots PRIVMSG {NICK} :\x01DCC SEND data.bin {LOCALHOST_U32} 5000 {len}\x01\r\n"
        );
        w.write_all(offer.as_bytes()).await.unwrap();
        // The client gives up without a QUIT; wait for it to hang up.
        while let Ok(Some(_)) = lines.next_line().await {}
    });

    let result = tokio::time::timeout(Duration::from_secs(20), app::run(settings(irc_port, dir.clone())))
        .await
        .expect("run finished in time");
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("already completely downloaded"));
    server.await.unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}
