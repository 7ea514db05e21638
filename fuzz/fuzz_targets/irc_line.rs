#![no_main]

use libfuzzer_sys::fuzz_target;
use xdcc_get::irc::{IrcMessage, strip_formatting};

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let _ = IrcMessage::parse(&line).map(|msg| {
        let _ = msg.nick();
        let _ = msg.numeric();
        for i in 0..msg.params.len() {
            let _ = msg.param(i).map(strip_formatting);
        }
    });
    let _ = strip_formatting(&line);
});
