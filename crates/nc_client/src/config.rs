//! Process-wide tunables resolved from the environment, in the shape of
//! `nauto_drivers::config`: a handful of `once_cell::sync::Lazy` statics
//! read once, each with a documented default, exposed through plain
//! accessor functions rather than a mutable global.

use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_NOTIF_THREAD_SLEEP_MS: u64 = 50;
const DEFAULT_GETSCHEMA_POLL_MS: u64 = 1;
const DEFAULT_GETSCHEMA_RECV_TIMEOUT_MS: u64 = 250;

static LOCK_TIMEOUT: Lazy<Duration> = Lazy::new(|| {
    env_duration_ms("NC_CLIENT_LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS)
});

static NOTIF_THREAD_SLEEP: Lazy<Duration> = Lazy::new(|| {
    env_duration_ms(
        "NC_CLIENT_NOTIF_THREAD_SLEEP_MS",
        DEFAULT_NOTIF_THREAD_SLEEP_MS,
    )
});

static GETSCHEMA_POLL: Lazy<Duration> = Lazy::new(|| {
    env_duration_ms("NC_CLIENT_GETSCHEMA_POLL_MS", DEFAULT_GETSCHEMA_POLL_MS)
});

static GETSCHEMA_RECV_TIMEOUT: Lazy<Duration> = Lazy::new(|| {
    env_duration_ms(
        "NC_CLIENT_GETSCHEMA_RECV_TIMEOUT_MS",
        DEFAULT_GETSCHEMA_RECV_TIMEOUT_MS,
    )
});

/// The default blocking budget used when a caller passes a negative
/// timeout ("block indefinitely", §5).
pub fn indefinite_lock_timeout() -> Duration {
    *LOCK_TIMEOUT
}

/// §4.H: sleep between dispatcher polls, named after the source's
/// `NC_CLIENT_NOTIF_THREAD_SLEEP`.
pub fn notif_thread_sleep() -> Duration {
    *NOTIF_THREAD_SLEEP
}

/// §4.E.1: sleep between busy-wait polls of the schema-fetch callback.
pub fn getschema_poll_interval() -> Duration {
    *GETSCHEMA_POLL
}

/// §4.E.1: the fixed 250 ms receive timeout the `<get-schema>` callback uses.
pub fn getschema_recv_timeout() -> Duration {
    *GETSCHEMA_RECV_TIMEOUT
}

/// Process-wide fallback YANG search directory (§9 Client context), settable
/// via `schema_searchpath` or the `NC_SCHEMA_SEARCHPATH` env var.
pub fn env_schema_searchpath() -> Option<PathBuf> {
    std::env::var_os("NC_SCHEMA_SEARCHPATH").map(PathBuf::from)
}

fn env_duration_ms(var: &str, default_ms: u64) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_nonzero() {
        assert!(indefinite_lock_timeout().as_millis() > 0);
        assert!(notif_thread_sleep().as_millis() > 0);
        assert!(getschema_poll_interval().as_millis() > 0);
        assert!(getschema_recv_timeout().as_millis() > 0);
    }
}
