/// Run-wide switches shared by the control-loop handlers.
///
/// `requests_sent` can only go from false to true; `report_pending` is raised by the ticker and
/// consumed by the reporter. The rest is fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct ProcessFlags {
    requests_sent: bool,
    report_pending: bool,
    verify_checksum: bool,
    ipv4_only: bool,
}

impl ProcessFlags {
    pub fn new(verify_checksum: bool, ipv4_only: bool) -> Self {
        Self {
            verify_checksum,
            ipv4_only,
            ..Self::default()
        }
    }

    pub fn requests_sent(&self) -> bool {
        self.requests_sent
    }

    /// Returns `true` only for the call that flipped the flag.
    pub fn mark_requests_sent(&mut self) -> bool {
        !std::mem::replace(&mut self.requests_sent, true)
    }

    pub fn request_report(&mut self) {
        self.report_pending = true;
    }

    pub fn report_pending(&self) -> bool {
        self.report_pending
    }

    pub fn take_report(&mut self) -> bool {
        std::mem::take(&mut self.report_pending)
    }

    pub fn verify_checksum(&self) -> bool {
        self.verify_checksum
    }

    pub fn ipv4_only(&self) -> bool {
        self.ipv4_only
    }
}
