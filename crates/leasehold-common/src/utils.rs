//! Host identity and clock utilities

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use if_addrs::IfAddr;

/// Get the first non-loopback IPv4 address of this host
///
/// Falls back to `127.0.0.1` when no suitable interface is found.
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .filter(|iface| !iface.is_loopback())
                .find_map(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Get the host name of this machine, or `localhost` if it cannot be read.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Current wall-clock time in unix milliseconds
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Convert unix milliseconds into a UTC timestamp, clamping out-of-range values to the epoch.
pub fn to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Render unix milliseconds as `yyyy-Mon-dd HH:MM:SS GMT`.
pub fn format_timestamp(millis: i64) -> String {
    to_datetime(millis).format("%Y-%b-%d %H:%M:%S GMT").to_string()
}
