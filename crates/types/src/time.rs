//! Wall-clock helpers.

use std::time::SystemTime;

/// Milliseconds since the UNIX epoch.
pub type TimestampMillis = u64;

/// Returns the current time expressed as UNIX timestamp in milliseconds.
pub fn now() -> TimestampMillis {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(n) => n.as_millis() as TimestampMillis,
        Err(_) => panic!("SystemTime before UNIX EPOCH!"),
    }
}

/// Returns the current time in nanoseconds since the UNIX epoch.
///
/// Used to order generated file names. Not guaranteed unique on its own.
pub fn now_nanos() -> u128 {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(n) => n.as_nanos(),
        Err(_) => panic!("SystemTime before UNIX EPOCH!"),
    }
}
