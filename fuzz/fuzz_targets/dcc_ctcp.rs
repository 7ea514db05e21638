#![no_main]

use libfuzzer_sys::fuzz_target;
use xdcc_get::checksum::extract_md5;
use xdcc_get::irc::ctcp::{ctcp_body, parse_dcc};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Some(body) = ctcp_body(&text) {
        let _ = parse_dcc("fuzzer", body);
    }
    let _ = parse_dcc("fuzzer", &text);
    let _ = extract_md5(&text);
});
