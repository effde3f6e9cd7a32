/// API path prefix
pub const API_PREFIX: &str = "/api";

/// Request header carrying the settings write token
pub const TOKEN_HEADER: &str = "token";

/// Length of a join code
pub const JOIN_CODE_LEN: usize = 6;

/// Default time-to-live for a host record: 5 days
pub const DEFAULT_HOST_TTL_SECS: u64 = 432_000;
