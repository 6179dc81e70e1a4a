//! Environment variable utilities
//!
//! ```ignore
//! use xfer_core::env::{env_get, env_get_opt};
//!
//! let interval_ms: u64 = env_get("XFER_POLL_INTERVAL_MS", 2);
//! let name: Option<String> = env_get_opt("XFER_WORKER_NAME");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// Unset and unparsable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable parsed as type T, if set and parsable.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
