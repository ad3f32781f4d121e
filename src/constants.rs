pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const SSH_DEFAULT_USERNAME: &str = "root";
    pub const TIMEOUT_SSH_CONNECT_SECS: u64 = 30;
    pub const TIMEOUT_SSH_EXEC_DEFAULT_SECS: u64 = 30;
    pub const TIMEOUT_SSH_EXEC_HARD_GRACE_MS: u64 = 2_000;
    pub const TIMEOUT_STATUS_PROBE_SECS: u64 = 10;
    pub const TIMEOUT_SERVICE_PROBE_SECS: u64 = 15;
    pub const TIMEOUT_DIAGNOSE_PROBE_SECS: u64 = 30;
    pub const TIMEOUT_PODS_PROBE_SECS: u64 = 30;
    pub const POLL_IDLE_SLEEP_MS: u64 = 20;
}

pub mod limits {
    pub const MAX_PORT: u16 = 65_535;
    pub const MIN_PORT: u16 = 1;
    pub const MAX_TIMEOUT_SECS: u64 = 3_600;
    pub const MAX_COMMAND_LENGTH: usize = 4_096;
    pub const MAX_HOSTNAME_LENGTH: usize = 253;
    pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;
    pub const READ_CHUNK_BYTES: usize = 8_192;
    pub const REJECTION_PREFIX_SAMPLE: usize = 10;
}

pub mod probes {
    pub const STATUS_UNAVAILABLE: &str = "N/A";
    pub const JOURNAL_TAIL_LINES: u32 = 50;
}
