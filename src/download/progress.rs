use crate::download::record::TransferRecord;
use crate::download::registry::DownloadRegistry;
use crate::logging::shorten;
use crate::session::TransferId;
use std::collections::HashMap;
use std::time::Instant;

pub const WAITING_MESSAGE: &str = "Please wait until the download is started!";
const BAR_WIDTH: u64 = 20;
const NAME_HEAD: usize = 28;
const NAME_TAIL: usize = 12;

#[derive(Debug, Clone, Copy)]
struct Sample {
    received: u64,
    at: Instant,
}

/// Renders the periodic progress snapshot. Only reads counters, never touches files.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    samples: HashMap<TransferId, Sample>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every registered transfer. A single transfer ends in `\r` so the next tick
    /// overwrites it; several transfers get one line each.
    pub fn render(&mut self, registry: &DownloadRegistry, now: Instant) -> String {
        match registry.active_count() {
            0 => format!("{WAITING_MESSAGE}\r"),
            1 => {
                let mut out = String::new();
                for record in registry.records() {
                    out.push_str(&self.line_for(record, now));
                }
                out.push('\r');
                out
            }
            _ => {
                let mut out = String::new();
                for record in registry.records() {
                    out.push_str(&self.line_for(record, now));
                    out.push('\n');
                }
                out
            }
        }
    }

    /// One transfer's line, updating its rate sample.
    pub fn line_for(&mut self, record: &TransferRecord, now: Instant) -> String {
        let rate = match self.samples.get(&record.id()) {
            Some(prev) => {
                let secs = now.saturating_duration_since(prev.at).as_secs_f64();
                if secs > 0.0 {
                    record.received().saturating_sub(prev.received) as f64 / secs
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.samples.insert(
            record.id(),
            Sample {
                received: record.received(),
                at: now,
            },
        );
        format_progress_line(record.file_name(), record.received(), record.expected(), rate)
    }
}

pub fn format_progress_line(name: &str, received: u64, expected: u64, rate: f64) -> String {
    let ratio = if expected == 0 {
        1.0
    } else {
        received.min(expected) as f64 / expected as f64
    };
    let filled = match expected {
        0 => BAR_WIDTH,
        _ => received.min(expected) * BAR_WIDTH / expected,
    };
    let bar = format!(
        "{}{}",
        "#".repeat(filled as usize),
        "-".repeat((BAR_WIDTH - filled) as usize)
    );
    format!(
        "{} [{bar}] {:5.1}% {}/{} {}/s",
        shorten(name, NAME_HEAD, NAME_TAIL),
        ratio * 100.0,
        format_size(received),
        format_size(expected),
        format_size(rate as u64)
    )
}

/// Binary units: `512 B`, `1.5 KiB`, `3.2 GiB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
